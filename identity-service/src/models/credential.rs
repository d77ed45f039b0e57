//! Credential model - links a user to an authority-side identity.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::access::{self, CurrentIds};
use crate::executor::Executor;
use crate::models::{Authority, Authorization, User};
use crate::scope::{
    encode_action, encode_scope, matching, CredentialAction, CredentialContext, EntityKind, Slot,
};
use crate::store::{self, ReadOptions, WriteMeta};

/// Current credential record.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub record_id: Uuid,
    #[sqlx(rename = "entity_id")]
    pub id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub authority_id: Uuid,
    pub authority_user_id: String,
    pub user_id: Uuid,
    pub details: serde_json::Value,
}

/// Desired credential state for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialData {
    pub id: Uuid,
    pub enabled: bool,
    pub authority_id: Uuid,
    pub authority_user_id: String,
    pub user_id: Uuid,
    pub details: serde_json::Value,
}

impl Credential {
    pub fn data(&self) -> CredentialData {
        CredentialData {
            id: self.id,
            enabled: self.enabled,
            authority_id: self.authority_id,
            authority_user_id: self.authority_user_id.clone(),
            user_id: self.user_id,
            details: self.details.clone(),
        }
    }

    pub async fn read(
        conn: &mut PgConnection,
        id: Uuid,
        options: &ReadOptions,
    ) -> Result<Credential, AppError> {
        let mut credentials = Self::read_many(conn, &[id], options).await?;
        credentials.pop().ok_or_else(|| {
            AppError::NotFound(format!("credential_records: no current record for {id}"))
        })
    }

    pub async fn read_many(
        conn: &mut PgConnection,
        ids: &[Uuid],
        options: &ReadOptions,
    ) -> Result<Vec<Credential>, AppError> {
        let sql = if options.for_update {
            "SELECT * FROM credential_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM credential_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL"
        };
        let rows: Vec<Credential> = sqlx::query_as(sql).bind(ids).fetch_all(conn).await?;
        store::check_read("credential_records", ids, &rows, |c| c.id)?;
        Ok(store::sort_by_ids(ids, rows, |c| c.id))
    }

    pub async fn write(
        conn: &mut PgConnection,
        data: &CredentialData,
        meta: &WriteMeta,
    ) -> Result<Credential, AppError> {
        store::ensure_identity(conn, "credentials", data.id).await?;
        store::close_chain(conn, "credential_records", data.id, meta.record_id).await?;
        let credential: Credential = sqlx::query_as(
            r#"
            INSERT INTO credential_records
                (record_id, entity_id, created_by_authorization_id, created_at,
                 enabled, authority_id, authority_user_id, user_id, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(meta.record_id)
        .bind(data.id)
        .bind(meta.created_by_authorization_id)
        .bind(meta.created_at)
        .bind(data.enabled)
        .bind(data.authority_id)
        .bind(&data.authority_user_id)
        .bind(data.user_id)
        .bind(&data.details)
        .fetch_one(conn)
        .await?;
        Ok(credential)
    }

    pub async fn create(
        conn: &mut PgConnection,
        data: &CredentialData,
        meta: &WriteMeta,
    ) -> Result<Credential, AppError> {
        if store::has_current(conn, "credential_records", data.id).await? {
            return Err(AppError::Conflict(format!(
                "credential {} already exists",
                data.id
            )));
        }
        Self::write(conn, data, meta).await
    }

    pub async fn authority(&self, exec: &mut Executor) -> Result<Authority, AppError> {
        exec.authority(self.authority_id).await
    }

    pub async fn user(&self, exec: &mut Executor) -> Result<User, AppError> {
        exec.user(self.user_id).await
    }

    pub async fn is_accessible_by(
        &self,
        realm: &str,
        acting: Option<&Authorization>,
        exec: &mut Executor,
        action: &CredentialAction,
    ) -> Result<bool, AppError> {
        let acting = match acting {
            Some(a) => a,
            None => return Ok(false),
        };
        let current = CurrentIds::for_authorization(exec, acting).await?;
        let access = acting.access(exec, &current).await?;
        if access.is_empty() {
            return Ok(false);
        }
        let target = encode_scope(
            realm,
            &CredentialContext {
                authority_id: Slot::Id(self.authority_id),
                credential_id: Slot::Id(self.id),
                user_id: Slot::Id(self.user_id),
            },
            action,
        );
        if matching::set_contains(&access, &target) {
            return Ok(true);
        }
        access::user_selectors_allow(
            realm,
            exec,
            acting,
            &access,
            EntityKind::Credential,
            self.user_id,
            &encode_action(action),
        )
        .await
    }
}
