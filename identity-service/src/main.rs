//! Operational entry point: migrate the schema and, on first run, seed the
//! store. Serving layers (GraphQL, OAuth2 endpoints) consume the library
//! from their own binaries.

use identity_service::{bootstrap, config::IdentityConfig, db, AppError};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = IdentityConfig::load()?;
    init_tracing(&config.service_name, &config.log_level);

    let pool = db::create_pool(&config.database)
        .await
        .map_err(AppError::from)?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::Database(anyhow::Error::new(e)))?;
    db::health_check(&pool).await.map_err(AppError::from)?;

    if let Some(outcome) = bootstrap::bootstrap_if_empty(&pool, &config.realm, &config.bootstrap).await? {
        // surfaced exactly once; the secret is never readable again
        tracing::warn!(
            authorization_id = %outcome.authorization_id,
            secret = %outcome.authorization_secret,
            "root authorization created - store this secret now"
        );
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        realm = %config.realm,
        "identity store ready"
    );
    Ok(())
}
