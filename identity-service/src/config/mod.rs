use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    /// Tenant/namespace prefix for every scope issued by this deployment.
    pub realm: String,
    pub database: DatabaseConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Provision a root user, super-administrator role and root
    /// authorization when the store is empty.
    pub enabled: bool,
    #[serde(default = "default_root_user_name")]
    pub root_user_name: String,
}

fn default_root_user_name() -> String {
    "root".to_string()
}

impl IdentityConfig {
    pub fn load() -> Result<Self, AppError> {
        core_config::load_service_config()
    }
}
