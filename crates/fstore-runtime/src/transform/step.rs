//! Transform step variants and their dispatcher

use crate::error::{Result, RuntimeError};
use crate::transform::{
    CustomHandler, DateExtractor, MapValues, OneHotEncoder, VocabularyMisses,
};
use fstore_core::Batch;

/// One node of a transform graph
#[derive(Debug, Clone)]
pub enum TransformStep {
    /// Value substitution
    MapValues(MapValues),

    /// Categorical one-hot encoding
    OneHotEncoder(OneHotEncoder),

    /// Date-part extraction
    DateExtractor(DateExtractor),

    /// Registered batch handler
    Custom(CustomHandler),
}

impl TransformStep {
    /// Kind name, also the default step name in a graph
    pub fn kind(&self) -> &str {
        match self {
            TransformStep::MapValues(_) => "map_values",
            TransformStep::OneHotEncoder(_) => "one_hot_encoder",
            TransformStep::DateExtractor(_) => "date_extractor",
            TransformStep::Custom(h) => &h.name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TransformStep::MapValues(step) => step.validate(),
            TransformStep::OneHotEncoder(step) => step.validate(),
            TransformStep::DateExtractor(step) => step.validate(),
            TransformStep::Custom(handler) => {
                if handler.name.is_empty() {
                    return Err(RuntimeError::InvalidConfig(
                        "custom handler name cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Apply the step to a full batch
    pub(crate) fn apply(
        &self,
        name: &str,
        batch: Batch,
        misses: &mut VocabularyMisses,
    ) -> Result<Batch> {
        match self {
            TransformStep::MapValues(step) => step.apply(name, batch),
            TransformStep::OneHotEncoder(step) => step.apply(name, batch, misses),
            TransformStep::DateExtractor(step) => step.apply(name, batch),
            TransformStep::Custom(handler) => handler.call(batch).map_err(|e| match e {
                RuntimeError::MissingColumn { column, .. } => RuntimeError::MissingColumn {
                    step: name.to_string(),
                    column,
                },
                other => RuntimeError::Transform {
                    step: name.to_string(),
                    message: other.to_string(),
                },
            }),
        }
    }
}

impl From<MapValues> for TransformStep {
    fn from(step: MapValues) -> Self {
        TransformStep::MapValues(step)
    }
}

impl From<OneHotEncoder> for TransformStep {
    fn from(step: OneHotEncoder) -> Self {
        TransformStep::OneHotEncoder(step)
    }
}

impl From<DateExtractor> for TransformStep {
    fn from(step: DateExtractor) -> Self {
        TransformStep::DateExtractor(step)
    }
}

impl From<CustomHandler> for TransformStep {
    fn from(handler: CustomHandler) -> Self {
        TransformStep::Custom(handler)
    }
}
