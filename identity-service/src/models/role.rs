//! Role model - named scope bundles assigned to users.
//!
//! Role scopes may contain `{current_*_id}` placeholders, so the same role
//! grants different literal access depending on who evaluates it.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::access::CurrentIds;
use crate::executor::Executor;
use crate::models::{Authorization, User};
use crate::scope::{encode_scope, matching, RoleAction, RoleContext, Slot};
use crate::store::{self, ReadOptions, WriteMeta};

/// Current role record.
#[derive(Debug, Clone, FromRow)]
pub struct Role {
    pub record_id: Uuid,
    #[sqlx(rename = "entity_id")]
    pub id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub name: String,
    pub scopes: Vec<String>,
    pub user_ids: Vec<Uuid>,
}

/// Desired role state for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleData {
    pub id: Uuid,
    pub enabled: bool,
    pub name: String,
    pub scopes: Vec<String>,
    pub user_ids: Vec<Uuid>,
}

impl Role {
    pub fn data(&self) -> RoleData {
        RoleData {
            id: self.id,
            enabled: self.enabled,
            name: self.name.clone(),
            scopes: self.scopes.clone(),
            user_ids: self.user_ids.clone(),
        }
    }

    pub async fn read(
        conn: &mut PgConnection,
        id: Uuid,
        options: &ReadOptions,
    ) -> Result<Role, AppError> {
        let mut roles = Self::read_many(conn, &[id], options).await?;
        roles
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("role_records: no current record for {id}")))
    }

    pub async fn read_many(
        conn: &mut PgConnection,
        ids: &[Uuid],
        options: &ReadOptions,
    ) -> Result<Vec<Role>, AppError> {
        let sql = if options.for_update {
            "SELECT * FROM role_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM role_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL"
        };
        let rows: Vec<Role> = sqlx::query_as(sql).bind(ids).fetch_all(conn).await?;
        store::check_read("role_records", ids, &rows, |r| r.id)?;
        Ok(store::sort_by_ids(ids, rows, |r| r.id))
    }

    /// Append a new current record. Scopes are re-simplified before they are
    /// persisted.
    pub async fn write(
        conn: &mut PgConnection,
        data: &RoleData,
        meta: &WriteMeta,
    ) -> Result<Role, AppError> {
        let scopes = matching::simplify(data.scopes.clone());
        store::ensure_identity(conn, "roles", data.id).await?;
        store::close_chain(conn, "role_records", data.id, meta.record_id).await?;
        let role: Role = sqlx::query_as(
            r#"
            INSERT INTO role_records
                (record_id, entity_id, created_by_authorization_id, created_at,
                 enabled, name, scopes, user_ids)
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
        .bind(&scopes)
        .bind(&data.user_ids)
        .fetch_one(conn)
        .await?;
        Ok(role)
    }

    pub async fn create(
        conn: &mut PgConnection,
        data: &RoleData,
        meta: &WriteMeta,
    ) -> Result<Role, AppError> {
        if store::has_current(conn, "role_records", data.id).await? {
            return Err(AppError::Conflict(format!("role {} already exists", data.id)));
        }
        Self::write(conn, data, meta).await
    }

    /// Users assigned to this role.
    pub async fn users(&self, exec: &mut Executor) -> Result<Vec<User>, AppError> {
        if self.user_ids.is_empty() {
            return Ok(Vec::new());
        }
        User::read_many(exec.conn(), &self.user_ids, &ReadOptions::default()).await
    }

    /// The scopes this role contributes for one evaluation: placeholders
    /// resolved against `current`, unresolvable scopes dropped.
    pub fn access(&self, current: &CurrentIds) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        let values = current.injection_values();
        self.scopes
            .iter()
            .filter_map(|scope| matching::inject(scope, &values))
            .collect()
    }

    pub async fn is_accessible_by(
        &self,
        realm: &str,
        acting: Option<&Authorization>,
        exec: &mut Executor,
        action: &RoleAction,
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
            &RoleContext {
                role_id: Slot::Id(self.id),
            },
            action,
        );
        Ok(matching::set_contains(&access, &target))
    }
}
