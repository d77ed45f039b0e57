//! First-run provisioning.
//!
//! An empty store is unusable: nothing can pass an accessibility check, so
//! nothing can create the first user. Bootstrap seeds a root user, a super
//! administrator role holding the all-wildcard scope, and a root
//! authorization whose secret is surfaced once to the operator.

use service_core::error::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::executor::Executor;
use crate::models::{AuthorizationData, RoleData, UserData, UserKind};
use crate::scope::SCOPE_VERSION;
use crate::store::WriteMeta;
use crate::utils::tokens;

/// Everything an operator needs to start using a freshly seeded store.
#[derive(Debug, Clone)]
pub struct BootstrapOutcome {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub authorization_id: Uuid,
    pub authorization_secret: String,
}

/// The scope granting every action on every entity in `realm`.
pub fn super_admin_scope(realm: &str) -> String {
    format!("{realm}:{SCOPE_VERSION}.*.*.*.*.*.*.*.*:*.*.*.*.*")
}

/// Seed the store if it has no users yet; returns `None` when it does.
pub async fn bootstrap_if_empty(
    pool: &PgPool,
    realm: &str,
    config: &BootstrapConfig,
) -> Result<Option<BootstrapOutcome>, AppError> {
    if !config.enabled {
        return Ok(None);
    }

    let mut exec = Executor::begin(pool).await?;
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(exec.conn())
        .await?;
    if users > 0 {
        exec.rollback().await?;
        return Ok(None);
    }

    let user = exec
        .create_user(
            &UserData {
                id: Uuid::new_v4(),
                enabled: true,
                kind: UserKind::Human,
                name: config.root_user_name.clone(),
            },
            &WriteMeta::new(None),
        )
        .await?;

    let role = exec
        .create_role(
            &RoleData {
                id: Uuid::new_v4(),
                enabled: true,
                name: "Super Administrator".to_string(),
                scopes: vec![super_admin_scope(realm)],
                user_ids: vec![user.id],
            },
            &WriteMeta::new(None),
        )
        .await?;

    let secret = tokens::generate_secret();
    let authorization = exec
        .create_authorization(
            &AuthorizationData {
                id: Uuid::new_v4(),
                enabled: true,
                user_id: user.id,
                grant_id: None,
                secret: secret.clone(),
                scopes: vec![super_admin_scope(realm)],
            },
            &WriteMeta::new(None),
        )
        .await?;

    exec.commit().await?;
    tracing::info!(
        user_id = %user.id,
        role_id = %role.id,
        authorization_id = %authorization.id,
        "bootstrapped empty store"
    );

    Ok(Some(BootstrapOutcome {
        user_id: user.id,
        role_id: role.id,
        authorization_id: authorization.id,
        authorization_secret: secret,
    }))
}
