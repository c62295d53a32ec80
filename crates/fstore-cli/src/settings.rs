//! Process settings loading

use fstore_sdk::StoreSettings;
use std::path::Path;

/// Load settings from `.env`, an optional `config/fstore.{yaml,toml,json}`
/// file and `FSTORE_*` environment variables, in increasing precedence
pub fn load() -> anyhow::Result<StoreSettings> {
    dotenvy::dotenv().ok();
    load_from(Path::new("config/fstore"))
}

pub fn load_from(file: &Path) -> anyhow::Result<StoreSettings> {
    let config_result = config::Config::builder()
        .add_source(config::File::from(file).required(false))
        .add_source(config::Environment::with_prefix("FSTORE"))
        .build();

    match config_result {
        Ok(cfg) => cfg
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize settings: {}", e)),
        Err(e) => {
            tracing::info!(error = %e, "No usable settings file, using defaults");
            Ok(StoreSettings::default())
        }
    }
}
