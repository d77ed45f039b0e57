//! User model - the identity every authorization ultimately resolves to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::access::{self, CurrentIds};
use crate::executor::Executor;
use crate::models::{Authorization, Credential, Grant, Role};
use crate::scope::{encode_action, encode_scope, matching, EntityKind, Slot, UserAction, UserContext};
use crate::store::{self, ReadOptions, WriteMeta};

/// User kind codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserKind {
    Human,
    Machine,
}

impl UserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserKind::Human => "human",
            UserKind::Machine => "machine",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "machine" => UserKind::Machine,
            _ => UserKind::Human,
        }
    }
}

/// Current user record.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub record_id: Uuid,
    #[sqlx(rename = "entity_id")]
    pub id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub user_kind: String,
    pub name: String,
}

/// Desired user state for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub id: Uuid,
    pub enabled: bool,
    pub kind: UserKind,
    pub name: String,
}

impl User {
    pub fn kind(&self) -> UserKind {
        UserKind::parse(&self.user_kind)
    }

    pub fn data(&self) -> UserData {
        UserData {
            id: self.id,
            enabled: self.enabled,
            kind: self.kind(),
            name: self.name.clone(),
        }
    }

    /// Read the current record for one user.
    pub async fn read(
        conn: &mut PgConnection,
        id: Uuid,
        options: &ReadOptions,
    ) -> Result<User, AppError> {
        let mut users = Self::read_many(conn, &[id], options).await?;
        users
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("user_records: no current record for {id}")))
    }

    /// Read the current records for several users; fails with `NotFound` if
    /// any id has none.
    pub async fn read_many(
        conn: &mut PgConnection,
        ids: &[Uuid],
        options: &ReadOptions,
    ) -> Result<Vec<User>, AppError> {
        let sql = if options.for_update {
            "SELECT * FROM user_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM user_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL"
        };
        let rows: Vec<User> = sqlx::query_as(sql).bind(ids).fetch_all(conn).await?;
        store::check_read("user_records", ids, &rows, |u| u.id)?;
        Ok(store::sort_by_ids(ids, rows, |u| u.id))
    }

    /// Append a new current record, closing the previous one.
    pub async fn write(
        conn: &mut PgConnection,
        data: &UserData,
        meta: &WriteMeta,
    ) -> Result<User, AppError> {
        store::ensure_identity(conn, "users", data.id).await?;
        store::close_chain(conn, "user_records", data.id, meta.record_id).await?;
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO user_records
                (record_id, entity_id, created_by_authorization_id, created_at,
                 enabled, user_kind, name)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(meta.record_id)
        .bind(data.id)
        .bind(meta.created_by_authorization_id)
        .bind(meta.created_at)
        .bind(data.enabled)
        .bind(data.kind.as_str())
        .bind(&data.name)
        .fetch_one(conn)
        .await?;
        Ok(user)
    }

    /// Write a first record; fails with `Conflict` if the user already has a
    /// current record.
    pub async fn create(
        conn: &mut PgConnection,
        data: &UserData,
        meta: &WriteMeta,
    ) -> Result<User, AppError> {
        if store::has_current(conn, "user_records", data.id).await? {
            return Err(AppError::Conflict(format!("user {} already exists", data.id)));
        }
        Self::write(conn, data, meta).await
    }

    /// Roles this user is assigned to.
    pub async fn roles(&self, exec: &mut Executor) -> Result<Vec<Role>, AppError> {
        let roles: Vec<Role> = sqlx::query_as(
            "SELECT * FROM role_records \
             WHERE replacement_record_id IS NULL AND $1 = ANY(user_ids)",
        )
        .bind(self.id)
        .fetch_all(exec.conn())
        .await?;
        Ok(roles)
    }

    pub async fn grants(&self, exec: &mut Executor) -> Result<Vec<Grant>, AppError> {
        let grants: Vec<Grant> = sqlx::query_as(
            "SELECT * FROM grant_records \
             WHERE replacement_record_id IS NULL AND user_id = $1",
        )
        .bind(self.id)
        .fetch_all(exec.conn())
        .await?;
        Ok(grants)
    }

    pub async fn credentials(&self, exec: &mut Executor) -> Result<Vec<Credential>, AppError> {
        let credentials: Vec<Credential> = sqlx::query_as(
            "SELECT * FROM credential_records \
             WHERE replacement_record_id IS NULL AND user_id = $1",
        )
        .bind(self.id)
        .fetch_all(exec.conn())
        .await?;
        Ok(credentials)
    }

    pub async fn authorizations(&self, exec: &mut Executor) -> Result<Vec<Authorization>, AppError> {
        let authorizations: Vec<Authorization> = sqlx::query_as(
            "SELECT * FROM authorization_records \
             WHERE replacement_record_id IS NULL AND user_id = $1",
        )
        .bind(self.id)
        .fetch_all(exec.conn())
        .await?;
        Ok(authorizations)
    }

    /// The user's effective access: the simplified union of its enabled
    /// roles' scopes with placeholders resolved against `current`.
    pub async fn access(
        &self,
        exec: &mut Executor,
        current: &CurrentIds,
    ) -> Result<Vec<String>, AppError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let roles = self.roles(exec).await?;
        let mut scopes = Vec::new();
        for role in roles {
            scopes.extend(role.access(current));
        }
        Ok(matching::simplify(scopes))
    }

    pub async fn is_accessible_by(
        &self,
        realm: &str,
        acting: Option<&Authorization>,
        exec: &mut Executor,
        action: &UserAction,
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
            &UserContext {
                user_id: Slot::Id(self.id),
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
            EntityKind::User,
            self.id,
            &encode_action(action),
        )
        .await
    }
}
