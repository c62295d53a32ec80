//! Custom batch handlers
//!
//! The escape hatch for domain-specific reshaping (renaming a label column,
//! casting types) that the built-in steps do not cover. Handlers are
//! registered by name so pipeline configuration can refer to them.

use crate::error::Result;
use fstore_core::Batch;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A batch -> batch function
pub trait BatchHandler: Send + Sync {
    fn handle(&self, batch: Batch) -> Result<Batch>;
}

impl<F> BatchHandler for F
where
    F: Fn(Batch) -> Result<Batch> + Send + Sync,
{
    fn handle(&self, batch: Batch) -> Result<Batch> {
        self(batch)
    }
}

/// A named handler bound into a transform graph
#[derive(Clone)]
pub struct CustomHandler {
    pub name: String,
    handler: Arc<dyn BatchHandler>,
}

impl CustomHandler {
    pub fn new(name: impl Into<String>, handler: impl BatchHandler + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }

    pub(crate) fn from_shared(name: impl Into<String>, handler: Arc<dyn BatchHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }

    pub(crate) fn call(&self, batch: Batch) -> Result<Batch> {
        self.handler.handle(batch)
    }
}

impl fmt::Debug for CustomHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Handlers available to configuration-built graphs
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn BatchHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, handler: impl BatchHandler + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn with(mut self, name: impl Into<String>, handler: impl BatchHandler + 'static) -> Self {
        self.register(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<CustomHandler> {
        self.handlers
            .get(name)
            .map(|h| CustomHandler::from_shared(name, Arc::clone(h)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
