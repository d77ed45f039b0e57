//! Request-scoped executor: one SERIALIZABLE transaction plus a memoizing
//! read cache per entity type.
//!
//! The cache exists only to avoid redundant reads within a single request's
//! resolution graph. It is keyed by entity id, cleared-and-primed by the
//! write wrappers, and never outlives or crosses the transaction. Dropping
//! the executor without committing rolls the transaction back.

use std::collections::HashMap;

use service_core::error::AppError;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    Authority, AuthorityData, Authorization, AuthorizationData, Client, ClientData, Credential,
    CredentialData, Grant, GrantData, Role, RoleData, User, UserData,
};
use crate::store::{ReadOptions, WriteMeta};

pub struct Executor {
    tx: Transaction<'static, Postgres>,
    users: HashMap<Uuid, User>,
    authorities: HashMap<Uuid, Authority>,
    credentials: HashMap<Uuid, Credential>,
    clients: HashMap<Uuid, Client>,
    grants: HashMap<Uuid, Grant>,
    authorizations: HashMap<Uuid, Authorization>,
    roles: HashMap<Uuid, Role>,
}

macro_rules! entity_ops {
    ($read:ident, $read_for_update:ident, $write:ident, $create:ident,
     $cache:ident, $entity:ty, $data:ty) => {
        /// Cached current-record read.
        pub async fn $read(&mut self, id: Uuid) -> Result<$entity, AppError> {
            if let Some(cached) = self.$cache.get(&id) {
                return Ok(cached.clone());
            }
            let entity = <$entity>::read(&mut self.tx, id, &ReadOptions::default()).await?;
            self.$cache.insert(id, entity.clone());
            Ok(entity)
        }

        /// Row-locked read for a read-check-then-write sequence; primes the
        /// cache with the locked state.
        pub async fn $read_for_update(&mut self, id: Uuid) -> Result<$entity, AppError> {
            let entity = <$entity>::read(&mut self.tx, id, &ReadOptions::for_update()).await?;
            self.$cache.insert(id, entity.clone());
            Ok(entity)
        }

        /// Write through the store, then clear-and-prime the cache entry.
        pub async fn $write(
            &mut self,
            data: &$data,
            meta: &WriteMeta,
        ) -> Result<$entity, AppError> {
            let entity = <$entity>::write(&mut self.tx, data, meta).await?;
            self.$cache.insert(entity.id, entity.clone());
            Ok(entity)
        }

        /// Create through the store, then prime the cache entry.
        pub async fn $create(
            &mut self,
            data: &$data,
            meta: &WriteMeta,
        ) -> Result<$entity, AppError> {
            let entity = <$entity>::create(&mut self.tx, data, meta).await?;
            self.$cache.insert(entity.id, entity.clone());
            Ok(entity)
        }
    };
}

impl Executor {
    /// Open a SERIALIZABLE transaction on the pool.
    pub async fn begin(pool: &PgPool) -> Result<Self, AppError> {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Self {
            tx,
            users: HashMap::new(),
            authorities: HashMap::new(),
            credentials: HashMap::new(),
            clients: HashMap::new(),
            grants: HashMap::new(),
            authorizations: HashMap::new(),
            roles: HashMap::new(),
        })
    }

    /// The underlying connection, for list queries and store calls that
    /// bypass the cache.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }

    entity_ops!(user, user_for_update, write_user, create_user, users, User, UserData);
    entity_ops!(
        authority,
        authority_for_update,
        write_authority,
        create_authority,
        authorities,
        Authority,
        AuthorityData
    );
    entity_ops!(
        credential,
        credential_for_update,
        write_credential,
        create_credential,
        credentials,
        Credential,
        CredentialData
    );
    entity_ops!(client, client_for_update, write_client, create_client, clients, Client, ClientData);
    entity_ops!(grant, grant_for_update, write_grant, create_grant, grants, Grant, GrantData);
    entity_ops!(
        authorization,
        authorization_for_update,
        write_authorization,
        create_authorization,
        authorizations,
        Authorization,
        AuthorizationData
    );
    entity_ops!(role, role_for_update, write_role, create_role, roles, Role, RoleData);
}
