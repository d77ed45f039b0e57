//! Grant model - a user's standing consent for one client.
//!
//! Carries the bearer secrets and single-use authorization codes issued for
//! the client, and the scopes the user consented to.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::access::{self, CurrentIds};
use crate::executor::Executor;
use crate::models::{Authorization, Client, User};
use crate::scope::{
    encode_action, encode_scope, matching, EntityKind, GrantAction, GrantContext, Slot,
};
use crate::store::{self, ReadOptions, WriteMeta};

/// Current grant record.
#[derive(Debug, Clone, FromRow)]
pub struct Grant {
    pub record_id: Uuid,
    #[sqlx(rename = "entity_id")]
    pub id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub secrets: Vec<String>,
    pub codes: Vec<String>,
    pub scopes: Vec<String>,
}

/// Desired grant state for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantData {
    pub id: Uuid,
    pub enabled: bool,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub secrets: Vec<String>,
    pub codes: Vec<String>,
    pub scopes: Vec<String>,
}

impl Grant {
    pub fn data(&self) -> GrantData {
        GrantData {
            id: self.id,
            enabled: self.enabled,
            client_id: self.client_id,
            user_id: self.user_id,
            secrets: self.secrets.clone(),
            codes: self.codes.clone(),
            scopes: self.scopes.clone(),
        }
    }

    pub async fn read(
        conn: &mut PgConnection,
        id: Uuid,
        options: &ReadOptions,
    ) -> Result<Grant, AppError> {
        let mut grants = Self::read_many(conn, &[id], options).await?;
        grants
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("grant_records: no current record for {id}")))
    }

    pub async fn read_many(
        conn: &mut PgConnection,
        ids: &[Uuid],
        options: &ReadOptions,
    ) -> Result<Vec<Grant>, AppError> {
        let sql = if options.for_update {
            "SELECT * FROM grant_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM grant_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL"
        };
        let rows: Vec<Grant> = sqlx::query_as(sql).bind(ids).fetch_all(conn).await?;
        store::check_read("grant_records", ids, &rows, |g| g.id)?;
        Ok(store::sort_by_ids(ids, rows, |g| g.id))
    }

    /// Append a new current record. Scopes are re-simplified before they are
    /// persisted.
    pub async fn write(
        conn: &mut PgConnection,
        data: &GrantData,
        meta: &WriteMeta,
    ) -> Result<Grant, AppError> {
        let scopes = matching::simplify(data.scopes.clone());
        store::ensure_identity(conn, "grants", data.id).await?;
        store::close_chain(conn, "grant_records", data.id, meta.record_id).await?;
        let grant: Grant = sqlx::query_as(
            r#"
            INSERT INTO grant_records
                (record_id, entity_id, created_by_authorization_id, created_at,
                 enabled, client_id, user_id, secrets, codes, scopes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(meta.record_id)
        .bind(data.id)
        .bind(meta.created_by_authorization_id)
        .bind(meta.created_at)
        .bind(data.enabled)
        .bind(data.client_id)
        .bind(data.user_id)
        .bind(&data.secrets)
        .bind(&data.codes)
        .bind(&scopes)
        .fetch_one(conn)
        .await?;
        Ok(grant)
    }

    pub async fn create(
        conn: &mut PgConnection,
        data: &GrantData,
        meta: &WriteMeta,
    ) -> Result<Grant, AppError> {
        if store::has_current(conn, "grant_records", data.id).await? {
            return Err(AppError::Conflict(format!("grant {} already exists", data.id)));
        }
        Self::write(conn, data, meta).await
    }

    pub async fn client(&self, exec: &mut Executor) -> Result<Client, AppError> {
        exec.client(self.client_id).await
    }

    pub async fn user(&self, exec: &mut Executor) -> Result<User, AppError> {
        exec.user(self.user_id).await
    }

    /// Authorizations issued under this grant.
    pub async fn authorizations(&self, exec: &mut Executor) -> Result<Vec<Authorization>, AppError> {
        let authorizations: Vec<Authorization> = sqlx::query_as(
            "SELECT * FROM authorization_records \
             WHERE replacement_record_id IS NULL AND grant_id = $1",
        )
        .bind(self.id)
        .fetch_all(exec.conn())
        .await?;
        Ok(authorizations)
    }

    /// The grant's effective access: its consented scopes, narrowed to what
    /// the owning user can actually do. Empty if the grant is disabled.
    pub async fn access(
        &self,
        exec: &mut Executor,
        current: &CurrentIds,
    ) -> Result<Vec<String>, AppError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let user = exec.user(self.user_id).await?;
        let user_access = user.access(exec, current).await?;
        Ok(matching::intersect_sets(&self.scopes, &user_access))
    }

    pub async fn is_accessible_by(
        &self,
        realm: &str,
        acting: Option<&Authorization>,
        exec: &mut Executor,
        action: &GrantAction,
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
            &GrantContext {
                client_id: Slot::Id(self.client_id),
                grant_id: Slot::Id(self.id),
                user_id: Slot::Id(self.user_id),
            },
            action,
        );
        if matching::set_contains(&access, &target) {
            return Ok(true);
        }
        let action_str = encode_action(action);
        // owners of the client this grant was issued for
        let probe = access::selector_probe(realm, EntityKind::Grant, "assigned", &action_str);
        if matching::set_contains(&access, &probe) {
            let client = exec.client(self.client_id).await?;
            if client.user_ids.contains(&acting.user_id) {
                return Ok(true);
            }
        }
        access::user_selectors_allow(
            realm,
            exec,
            acting,
            &access,
            EntityKind::Grant,
            self.user_id,
            &action_str,
        )
        .await
    }
}
