//! Client model - an OAuth2 client with assigned owner users.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::access::{self, CurrentIds};
use crate::executor::Executor;
use crate::models::{Authorization, Grant};
use crate::scope::{
    encode_action, encode_scope, matching, ClientAction, ClientContext, EntityKind, Slot,
};
use crate::store::{self, ReadOptions, WriteMeta};

/// Current client record.
#[derive(Debug, Clone, FromRow)]
pub struct Client {
    pub record_id: Uuid,
    #[sqlx(rename = "entity_id")]
    pub id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
    pub name: String,
    pub secrets: Vec<String>,
    pub urls: Vec<String>,
    pub user_ids: Vec<Uuid>,
}

/// Desired client state for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientData {
    pub id: Uuid,
    pub enabled: bool,
    pub name: String,
    pub secrets: Vec<String>,
    pub urls: Vec<String>,
    pub user_ids: Vec<Uuid>,
}

impl Client {
    pub fn data(&self) -> ClientData {
        ClientData {
            id: self.id,
            enabled: self.enabled,
            name: self.name.clone(),
            secrets: self.secrets.clone(),
            urls: self.urls.clone(),
            user_ids: self.user_ids.clone(),
        }
    }

    pub async fn read(
        conn: &mut PgConnection,
        id: Uuid,
        options: &ReadOptions,
    ) -> Result<Client, AppError> {
        let mut clients = Self::read_many(conn, &[id], options).await?;
        clients.pop().ok_or_else(|| {
            AppError::NotFound(format!("client_records: no current record for {id}"))
        })
    }

    pub async fn read_many(
        conn: &mut PgConnection,
        ids: &[Uuid],
        options: &ReadOptions,
    ) -> Result<Vec<Client>, AppError> {
        let sql = if options.for_update {
            "SELECT * FROM client_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL FOR UPDATE"
        } else {
            "SELECT * FROM client_records \
             WHERE entity_id = ANY($1) AND replacement_record_id IS NULL"
        };
        let rows: Vec<Client> = sqlx::query_as(sql).bind(ids).fetch_all(conn).await?;
        store::check_read("client_records", ids, &rows, |c| c.id)?;
        Ok(store::sort_by_ids(ids, rows, |c| c.id))
    }

    pub async fn write(
        conn: &mut PgConnection,
        data: &ClientData,
        meta: &WriteMeta,
    ) -> Result<Client, AppError> {
        store::ensure_identity(conn, "clients", data.id).await?;
        store::close_chain(conn, "client_records", data.id, meta.record_id).await?;
        let client: Client = sqlx::query_as(
            r#"
            INSERT INTO client_records
                (record_id, entity_id, created_by_authorization_id, created_at,
                 enabled, name, secrets, urls, user_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(meta.record_id)
        .bind(data.id)
        .bind(meta.created_by_authorization_id)
        .bind(meta.created_at)
        .bind(data.enabled)
        .bind(&data.name)
        .bind(&data.secrets)
        .bind(&data.urls)
        .bind(&data.user_ids)
        .fetch_one(conn)
        .await?;
        Ok(client)
    }

    pub async fn create(
        conn: &mut PgConnection,
        data: &ClientData,
        meta: &WriteMeta,
    ) -> Result<Client, AppError> {
        if store::has_current(conn, "client_records", data.id).await? {
            return Err(AppError::Conflict(format!(
                "client {} already exists",
                data.id
            )));
        }
        Self::write(conn, data, meta).await
    }

    /// Grants issued for this client.
    pub async fn grants(&self, exec: &mut Executor) -> Result<Vec<Grant>, AppError> {
        let grants: Vec<Grant> = sqlx::query_as(
            "SELECT * FROM grant_records \
             WHERE replacement_record_id IS NULL AND client_id = $1",
        )
        .bind(self.id)
        .fetch_all(exec.conn())
        .await?;
        Ok(grants)
    }

    pub async fn is_accessible_by(
        &self,
        realm: &str,
        acting: Option<&Authorization>,
        exec: &mut Executor,
        action: &ClientAction,
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
            &ClientContext {
                client_id: Slot::Id(self.id),
            },
            action,
        );
        if matching::set_contains(&access, &target) {
            return Ok(true);
        }
        // assigned owners may act on their own clients
        let probe =
            access::selector_probe(realm, EntityKind::Client, "assigned", &encode_action(action));
        Ok(matching::set_contains(&access, &probe) && self.user_ids.contains(&acting.user_id))
    }
}
