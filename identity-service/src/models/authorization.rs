//! Authorization model - a bearer token scoped to a user, optionally through
//! a grant.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::access::{self, CurrentIds};
use crate::executor::Executor;
use crate::models::{Grant, User};
use crate::scope::{
    encode_action, encode_scope, matching, AuthorizationAction, AuthorizationContext, EntityKind,
    Slot,
};
use crate::store::{self, ReadOptions, WriteMeta};

/// Current authorization record.
#[derive(Debug, Clone, FromRow)]
pub struct Authorization {
    pub record_id: Uuid,
    #[sqlx(rename = "entity_id")]
    pub id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub user_id: Uuid,
    pub grant_id: Option<Uuid>,
    pub secret: String,
    pub scopes: Vec<String>,
}

/// Desired authorization state for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationData {
    pub id: Uuid,
    pub enabled: bool,
    pub user_id: Uuid,
    pub grant_id: Option<Uuid>,
    pub secret: String,
    pub scopes: Vec<String>,
}

impl Authorization {
    pub fn data(&self) -> AuthorizationData {
        AuthorizationData {
            id: self.id,
            enabled: self.enabled,
            user_id: self.user_id,
            grant_id: self.grant_id,
            secret: self.secret.clone(),
            scopes: self.scopes.clone(),
        }
    }

    pub async fn read(
        conn: &mut PgConnection,
        id: Uuid,
        options: &ReadOptions,
    ) -> Result<Authorization, AppError> {
        let mut authorizations = Self::read_many(conn, &[id], options).await?;
        authorizations.pop().ok_or_else(|| {
            AppError::NotFound(format!("authorization_records: no current record for {id}"))
        })
    }

    pub async fn read_many(
        conn: &mut PgConnection,
        ids: &[Uuid],
        options: &ReadOptions,
    ) -> Result<Vec<Authorization>, AppError> {
        let sql = if options.for_update {
            "SELECT * FROM authorization_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM authorization_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL"
        };
        let rows: Vec<Authorization> = sqlx::query_as(sql).bind(ids).fetch_all(conn).await?;
        store::check_read("authorization_records", ids, &rows, |a| a.id)?;
        Ok(store::sort_by_ids(ids, rows, |a| a.id))
    }

    /// Append a new current record. Scopes are re-simplified, and when a
    /// grant is referenced it must belong to the same user.
    pub async fn write(
        conn: &mut PgConnection,
        data: &AuthorizationData,
        meta: &WriteMeta,
    ) -> Result<Authorization, AppError> {
        if let Some(grant_id) = data.grant_id {
            let grant = Grant::read(conn, grant_id, &ReadOptions::default()).await?;
            if grant.user_id != data.user_id {
                return Err(AppError::Invariant(format!(
                    "authorization {} belongs to user {} but its grant {} belongs to user {}",
                    data.id, data.user_id, grant_id, grant.user_id
                )));
            }
        }
        let scopes = matching::simplify(data.scopes.clone());
        store::ensure_identity(conn, "authorizations", data.id).await?;
        store::close_chain(conn, "authorization_records", data.id, meta.record_id).await?;
        let authorization: Authorization = sqlx::query_as(
            r#"
            INSERT INTO authorization_records
                (record_id, entity_id, created_by_authorization_id, created_at,
                 enabled, user_id, grant_id, secret, scopes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(meta.record_id)
        .bind(data.id)
        .bind(meta.created_by_authorization_id)
        .bind(meta.created_at)
        .bind(data.enabled)
        .bind(data.user_id)
        .bind(data.grant_id)
        .bind(&data.secret)
        .bind(&scopes)
        .fetch_one(conn)
        .await?;
        Ok(authorization)
    }

    pub async fn create(
        conn: &mut PgConnection,
        data: &AuthorizationData,
        meta: &WriteMeta,
    ) -> Result<Authorization, AppError> {
        if store::has_current(conn, "authorization_records", data.id).await? {
            return Err(AppError::Conflict(format!(
                "authorization {} already exists",
                data.id
            )));
        }
        Self::write(conn, data, meta).await
    }

    pub async fn user(&self, exec: &mut Executor) -> Result<User, AppError> {
        exec.user(self.user_id).await
    }

    pub async fn grant(&self, exec: &mut Executor) -> Result<Option<Grant>, AppError> {
        match self.grant_id {
            Some(grant_id) => Ok(Some(exec.grant(grant_id).await?)),
            None => Ok(None),
        }
    }

    /// The authorization's effective access: its scopes, narrowed through the
    /// grant when one is attached, else through the user directly. Empty if
    /// the authorization is disabled.
    pub async fn access(
        &self,
        exec: &mut Executor,
        current: &CurrentIds,
    ) -> Result<Vec<String>, AppError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let base = match self.grant_id {
            Some(grant_id) => {
                let grant = exec.grant(grant_id).await?;
                grant.access(exec, current).await?
            }
            None => {
                let user = exec.user(self.user_id).await?;
                user.access(exec, current).await?
            }
        };
        Ok(matching::intersect_sets(&self.scopes, &base))
    }

    pub async fn is_accessible_by(
        &self,
        realm: &str,
        acting: Option<&Authorization>,
        exec: &mut Executor,
        action: &AuthorizationAction,
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
        let client_id = match self.grant_id {
            Some(grant_id) => Slot::Id(exec.grant(grant_id).await?.client_id),
            None => Slot::Empty,
        };
        let target = encode_scope(
            realm,
            &AuthorizationContext {
                authorization_id: Slot::Id(self.id),
                client_id,
                grant_id: match self.grant_id {
                    Some(grant_id) => Slot::Id(grant_id),
                    None => Slot::Empty,
                },
                user_id: Slot::Id(self.user_id),
            },
            action,
        );
        if matching::set_contains(&access, &target) {
            return Ok(true);
        }
        let action_str = encode_action(action);
        // owners of the client this authorization was issued through
        let probe =
            access::selector_probe(realm, EntityKind::Authorization, "assigned", &action_str);
        if matching::set_contains(&access, &probe) {
            if let Some(grant_id) = self.grant_id {
                let grant = exec.grant(grant_id).await?;
                let client = exec.client(grant.client_id).await?;
                if client.user_ids.contains(&acting.user_id) {
                    return Ok(true);
                }
            }
        }
        access::user_selectors_allow(
            realm,
            exec,
            acting,
            &access,
            EntityKind::Authorization,
            self.user_id,
            &action_str,
        )
        .await
    }
}
