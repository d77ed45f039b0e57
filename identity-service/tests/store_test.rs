//! Integration tests for the versioned entity store.
//!
//! Chain invariant, read/write round-trips, create conflicts and
//! concurrent-write safety, all against a live PostgreSQL.

mod common;

use common::{seed_user, test_pool, user_data, REALM};
use identity_service::bootstrap::super_admin_scope;
use identity_service::models::{RoleData, User, UserKind};
use identity_service::store::{ReadOptions, WriteMeta};
use identity_service::{AppError, Executor};
use sqlx::Row;
use uuid::Uuid;

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn write_then_read_round_trips() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let data = user_data("carol");
    let written = exec.create_user(&data, &WriteMeta::new(None)).await.unwrap();
    assert_eq!(written.data(), data);

    let read = User::read(exec.conn(), data.id, &ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(read.data(), data);
    assert_eq!(read.record_id, written.record_id);
    exec.commit().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn read_of_unknown_id_is_not_found() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();
    let err = User::read(exec.conn(), Uuid::new_v4(), &ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn create_of_existing_id_is_conflict() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let data = user_data("dave");
    exec.create_user(&data, &WriteMeta::new(None)).await.unwrap();
    let err = exec
        .create_user(&data, &WriteMeta::new(None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn record_chain_stays_linear_after_sequential_writes() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let mut data = user_data("erin");
    exec.create_user(&data, &WriteMeta::new(None)).await.unwrap();
    for i in 0..4 {
        data.name = format!("erin v{i}");
        exec.write_user(&data, &WriteMeta::new(None)).await.unwrap();
    }
    exec.commit().await.unwrap();

    let rows = sqlx::query(
        "SELECT record_id, replacement_record_id FROM user_records WHERE entity_id = $1",
    )
    .bind(data.id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 5);

    let current: Vec<&sqlx::postgres::PgRow> = rows
        .iter()
        .filter(|r| r.get::<Option<Uuid>, _>("replacement_record_id").is_none())
        .collect();
    assert_eq!(current.len(), 1, "exactly one current record");

    // every closed record points at a record that exists, and walking the
    // pointers from the oldest record reaches the current one with no cycle
    let mut pointers = std::collections::HashMap::new();
    for row in &rows {
        let record: Uuid = row.get("record_id");
        let replacement: Option<Uuid> = row.get("replacement_record_id");
        pointers.insert(record, replacement);
    }
    let replaced: std::collections::HashSet<Uuid> =
        pointers.values().flatten().copied().collect();
    assert_eq!(replaced.len(), 4, "no branching in the chain");
    let mut cursor = *pointers
        .keys()
        .find(|record| !replaced.contains(record))
        .expect("a chain head");
    let mut hops = 0;
    while let Some(Some(next)) = pointers.get(&cursor) {
        cursor = *next;
        hops += 1;
        assert!(hops <= 5, "cycle detected");
    }
    assert_eq!(hops, 4);
    assert!(pointers[&cursor].is_none(), "chain ends at the current record");
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn concurrent_writers_cannot_both_replace_a_record() {
    let pool = test_pool().await;

    let mut setup = Executor::begin(&pool).await.unwrap();
    let data = user_data("frank");
    setup.create_user(&data, &WriteMeta::new(None)).await.unwrap();
    setup.commit().await.unwrap();

    let mut a = Executor::begin(&pool).await.unwrap();
    let mut b = Executor::begin(&pool).await.unwrap();

    // b takes its serializable snapshot before a replaces the record
    b.user(data.id).await.unwrap();

    let mut update_a = data.clone();
    update_a.name = "frank (a)".to_string();
    a.write_user(&update_a, &WriteMeta::new(None)).await.unwrap();
    a.commit().await.unwrap();

    let mut update_b = data.clone();
    update_b.name = "frank (b)".to_string();
    let err = b
        .write_user(&update_b, &WriteMeta::new(None))
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "loser must abort with a retryable conflict: {err:?}");
    b.rollback().await.unwrap();

    let current = sqlx::query(
        "SELECT name FROM user_records WHERE entity_id = $1 AND replacement_record_id IS NULL",
    )
    .bind(data.id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].get::<String, _>("name"), "frank (a)");
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn for_update_read_serializes_read_then_write() {
    let pool = test_pool().await;

    let mut setup = Executor::begin(&pool).await.unwrap();
    let user_id = seed_user(&mut setup, "grace").await;
    setup.commit().await.unwrap();

    let mut exec = Executor::begin(&pool).await.unwrap();
    let locked = exec.user_for_update(user_id).await.unwrap();
    let mut data = locked.data();
    data.enabled = false;
    let written = exec.write_user(&data, &WriteMeta::new(None)).await.unwrap();
    assert!(!written.enabled);
    exec.commit().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn authorization_write_rejects_foreign_grant() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let owner = seed_user(&mut exec, "heidi").await;
    let other = seed_user(&mut exec, "ivan").await;
    let client_id = common::seed_client(&mut exec, &[]).await;
    let grant_id = common::seed_grant(&mut exec, client_id, owner, &[]).await;

    let err = exec
        .create_authorization(
            &identity_service::models::AuthorizationData {
                id: Uuid::new_v4(),
                enabled: true,
                user_id: other,
                grant_id: Some(grant_id),
                secret: identity_service::utils::tokens::generate_secret(),
                scopes: Vec::new(),
            },
            &WriteMeta::new(None),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invariant(_)));
    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn role_scopes_are_simplified_on_write() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let role = exec
        .create_role(
            &RoleData {
                id: Uuid::new_v4(),
                enabled: true,
                name: "admins".to_string(),
                scopes: vec![
                    format!("{REALM}:v2.user.......*:r...."),
                    format!("{REALM}:v2.user.......{}:r....", Uuid::new_v4()),
                    super_admin_scope(REALM),
                ],
                user_ids: Vec::new(),
            },
            &WriteMeta::new(None),
        )
        .await
        .unwrap();
    assert_eq!(role.scopes, vec![super_admin_scope(REALM)]);
    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn executor_cache_is_primed_by_writes() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let data = user_data("judy");
    exec.create_user(&data, &WriteMeta::new(None)).await.unwrap();
    let cached = exec.user(data.id).await.unwrap();
    assert_eq!(cached.name, "judy");

    let mut update = data.clone();
    update.kind = UserKind::Machine;
    exec.write_user(&update, &WriteMeta::new(None)).await.unwrap();
    let cached = exec.user(data.id).await.unwrap();
    assert_eq!(cached.kind(), UserKind::Machine);
    exec.rollback().await.unwrap();
}
