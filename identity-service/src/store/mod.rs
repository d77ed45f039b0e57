//! Append-only versioned entity storage.
//!
//! Every entity type keeps an immutable identity row plus a chain of record
//! rows linked by `replacement_record_id`; the single record with a NULL
//! pointer is the entity's current state. The conditional UPDATE in
//! [`close_chain`] is the optimistic-concurrency gate: all write paths must
//! run inside a SERIALIZABLE transaction (see [`crate::executor::Executor`])
//! so two writers racing to replace the same current record cannot both
//! succeed.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::PgConnection;
use uuid::Uuid;

/// Options for current-record reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Take a row lock on the current record to serialize a subsequent write
    /// against concurrent replacements.
    pub for_update: bool,
}

impl ReadOptions {
    pub fn for_update() -> Self {
        Self { for_update: true }
    }
}

/// Creation metadata for a new record row.
#[derive(Debug, Clone)]
pub struct WriteMeta {
    pub record_id: Uuid,
    pub created_by_authorization_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl WriteMeta {
    pub fn new(created_by_authorization_id: Option<Uuid>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            created_by_authorization_id,
            created_at: Utc::now(),
        }
    }
}

/// Idempotently insert the identity row for an entity.
pub(crate) async fn ensure_identity(
    conn: &mut PgConnection,
    identity_table: &str,
    id: Uuid,
) -> Result<(), AppError> {
    let sql = format!("INSERT INTO {identity_table} (id) VALUES ($1) ON CONFLICT (id) DO NOTHING");
    sqlx::query(&sql).bind(id).execute(conn).await?;
    Ok(())
}

/// Point the entity's current record (if any) at its replacement.
///
/// Returns how many records were closed; more than one means the
/// single-current-record invariant was already broken.
pub(crate) async fn close_chain(
    conn: &mut PgConnection,
    records_table: &str,
    entity_id: Uuid,
    new_record_id: Uuid,
) -> Result<usize, AppError> {
    let sql = format!(
        "UPDATE {records_table} SET replacement_record_id = $1 \
         WHERE entity_id = $2 AND replacement_record_id IS NULL RETURNING record_id"
    );
    let closed = sqlx::query(&sql)
        .bind(new_record_id)
        .bind(entity_id)
        .fetch_all(conn)
        .await?;
    if closed.len() > 1 {
        return Err(AppError::Invariant(format!(
            "{records_table}: replaced {} current records for entity {entity_id}",
            closed.len()
        )));
    }
    Ok(closed.len())
}

/// Whether the entity has a current record.
pub(crate) async fn has_current(
    conn: &mut PgConnection,
    records_table: &str,
    entity_id: Uuid,
) -> Result<bool, AppError> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {records_table} \
         WHERE entity_id = $1 AND replacement_record_id IS NULL)"
    );
    let exists: bool = sqlx::query_scalar(&sql).bind(entity_id).fetch_one(conn).await?;
    Ok(exists)
}

/// Validate the row count of a current-record read against the requested
/// ids. More rows than ids indicates chain corruption and is fatal; fewer is
/// a recoverable `NotFound` naming the missing ids.
pub(crate) fn check_read<T>(
    records_table: &str,
    ids: &[Uuid],
    rows: &[T],
    row_id: impl Fn(&T) -> Uuid,
) -> Result<(), AppError> {
    if rows.len() > ids.len() {
        return Err(AppError::Invariant(format!(
            "{records_table}: {} current records returned for {} ids",
            rows.len(),
            ids.len()
        )));
    }
    if rows.len() < ids.len() {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !rows.iter().any(|r| row_id(r) == **id))
            .map(|id| id.to_string())
            .collect();
        return Err(AppError::NotFound(format!(
            "{records_table}: no current record for {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Reorder read results to match the requested id order.
pub(crate) fn sort_by_ids<T>(ids: &[Uuid], mut rows: Vec<T>, row_id: impl Fn(&T) -> Uuid) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for id in ids {
        if let Some(pos) = rows.iter().position(|r| row_id(r) == *id) {
            out.push(rows.swap_remove(pos));
        }
    }
    out
}
