//! Authority model - a configured credential strategy instance.
//!
//! Strategy internals (password, email, openid) live outside this crate;
//! the authority row only carries the strategy tag and its opaque details.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::access::CurrentIds;
use crate::executor::Executor;
use crate::models::{Authorization, Credential};
use crate::scope::{encode_scope, matching, AuthorityAction, AuthorityContext, Slot};
use crate::store::{self, ReadOptions, WriteMeta};

/// Current authority record.
#[derive(Debug, Clone, FromRow)]
pub struct Authority {
    pub record_id: Uuid,
    #[sqlx(rename = "entity_id")]
    pub id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub name: String,
    pub strategy: String,
    pub details: serde_json::Value,
}

/// Desired authority state for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityData {
    pub id: Uuid,
    pub enabled: bool,
    pub name: String,
    pub strategy: String,
    pub details: serde_json::Value,
}

impl Authority {
    pub fn data(&self) -> AuthorityData {
        AuthorityData {
            id: self.id,
            enabled: self.enabled,
            name: self.name.clone(),
            strategy: self.strategy.clone(),
            details: self.details.clone(),
        }
    }

    pub async fn read(
        conn: &mut PgConnection,
        id: Uuid,
        options: &ReadOptions,
    ) -> Result<Authority, AppError> {
        let mut authorities = Self::read_many(conn, &[id], options).await?;
        authorities.pop().ok_or_else(|| {
            AppError::NotFound(format!("authority_records: no current record for {id}"))
        })
    }

    pub async fn read_many(
        conn: &mut PgConnection,
        ids: &[Uuid],
        options: &ReadOptions,
    ) -> Result<Vec<Authority>, AppError> {
        let sql = if options.for_update {
            "SELECT * FROM authority_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM authority_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL"
        };
        let rows: Vec<Authority> = sqlx::query_as(sql).bind(ids).fetch_all(conn).await?;
        store::check_read("authority_records", ids, &rows, |a| a.id)?;
        Ok(store::sort_by_ids(ids, rows, |a| a.id))
    }

    pub async fn write(
        conn: &mut PgConnection,
        data: &AuthorityData,
        meta: &WriteMeta,
    ) -> Result<Authority, AppError> {
        store::ensure_identity(conn, "authorities", data.id).await?;
        store::close_chain(conn, "authority_records", data.id, meta.record_id).await?;
        let authority: Authority = sqlx::query_as(
            r#"
            INSERT INTO authority_records
                (record_id, entity_id, created_by_authorization_id, created_at,
                 enabled, name, strategy, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(meta.record_id)
        .bind(data.id)
        .bind(meta.created_by_authorization_id)
        .bind(meta.created_at)
        .bind(data.enabled)
        .bind(&data.name)
        .bind(&data.strategy)
        .bind(&data.details)
        .fetch_one(conn)
        .await?;
        Ok(authority)
    }

    pub async fn create(
        conn: &mut PgConnection,
        data: &AuthorityData,
        meta: &WriteMeta,
    ) -> Result<Authority, AppError> {
        if store::has_current(conn, "authority_records", data.id).await? {
            return Err(AppError::Conflict(format!(
                "authority {} already exists",
                data.id
            )));
        }
        Self::write(conn, data, meta).await
    }

    /// Credentials issued under this authority.
    pub async fn credentials(&self, exec: &mut Executor) -> Result<Vec<Credential>, AppError> {
        let credentials: Vec<Credential> = sqlx::query_as(
            "SELECT * FROM credential_records \
             WHERE replacement_record_id IS NULL AND authority_id = $1",
        )
        .bind(self.id)
        .fetch_all(exec.conn())
        .await?;
        Ok(credentials)
    }

    pub async fn is_accessible_by(
        &self,
        realm: &str,
        acting: Option<&Authorization>,
        exec: &mut Executor,
        action: &AuthorityAction,
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
            &AuthorityContext {
                authority_id: Slot::Id(self.id),
            },
            action,
        );
        Ok(matching::set_contains(&access, &target))
    }
}
