use crate::error::AppError;
use config::{Config as Cfg, File};

/// Load a service's configuration type.
///
/// Layers `configuration.*` file values under `APP__`-prefixed environment
/// overrides, so `APP__DATABASE__URL` wins over the file's `database.url`.
pub fn load_service_config<T: serde::de::DeserializeOwned>() -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}
