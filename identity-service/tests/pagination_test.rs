//! Integration tests for the rule engine: cursor pagination against live
//! rows, and equivalence of the compiled accessibility predicate with the
//! row-by-row evaluator.

mod common;

use common::{seed_authorization, seed_role, seed_user, test_pool, REALM};
use identity_service::access::CurrentIds;
use identity_service::models::User;
use identity_service::rules::{
    run_query, ForwardCursorRule, IsAccessibleByRule, ReverseCursorRule, Rule,
};
use identity_service::scope::{AxisValue, EntityKind, UserAction};
use identity_service::Executor;
use uuid::Uuid;

const USERS_QUERY: &str =
    "SELECT * FROM user_records WHERE replacement_record_id IS NULL";

async fn seed_users(exec: &mut Executor, n: usize) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        ids.push(seed_user(exec, &format!("user {i}")).await);
    }
    ids.sort();
    ids
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn forward_pagination_walks_all_rows() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();
    let ids = seed_users(&mut exec, 5).await;

    let first_rule = ForwardCursorRule::new(2, None).unwrap();
    let rows: Vec<User> = run_query(exec.conn(), USERS_QUERY, &[&first_rule])
        .await
        .unwrap();
    let page = first_rule.page(rows);
    assert_eq!(page.items.len(), 2);
    assert!(page.page_info.has_next_page);
    let got: Vec<Uuid> = page.items.iter().map(|u| u.id).collect();
    assert_eq!(got, &ids[0..2]);

    let second_rule =
        ForwardCursorRule::new(2, page.page_info.end_cursor.as_deref()).unwrap();
    let rows: Vec<User> = run_query(exec.conn(), USERS_QUERY, &[&second_rule])
        .await
        .unwrap();
    let page = second_rule.page(rows);
    assert_eq!(page.items.len(), 2);
    assert!(page.page_info.has_next_page);
    let got: Vec<Uuid> = page.items.iter().map(|u| u.id).collect();
    assert_eq!(got, &ids[2..4]);

    let last_rule =
        ForwardCursorRule::new(2, page.page_info.end_cursor.as_deref()).unwrap();
    let rows: Vec<User> = run_query(exec.conn(), USERS_QUERY, &[&last_rule])
        .await
        .unwrap();
    let page = last_rule.page(rows);
    assert_eq!(page.items.len(), 1);
    assert!(!page.page_info.has_next_page);
    assert_eq!(page.items[0].id, ids[4]);

    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn reverse_pagination_mirrors_forward() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();
    let ids = seed_users(&mut exec, 5).await;

    let rule = ReverseCursorRule::new(2, None).unwrap();
    let rows: Vec<User> = run_query(exec.conn(), USERS_QUERY, &[&rule])
        .await
        .unwrap();
    let page = rule.page(rows);
    assert_eq!(page.items.len(), 2);
    assert!(page.page_info.has_previous_page);
    assert!(!page.page_info.has_next_page);
    // ascending order is preserved even when paginating backwards
    let got: Vec<Uuid> = page.items.iter().map(|u| u.id).collect();
    assert_eq!(got, &ids[3..5]);

    let rule = ReverseCursorRule::new(2, page.page_info.start_cursor.as_deref()).unwrap();
    let rows: Vec<User> = run_query(exec.conn(), USERS_QUERY, &[&rule])
        .await
        .unwrap();
    let page = rule.page(rows);
    let got: Vec<Uuid> = page.items.iter().map(|u| u.id).collect();
    assert_eq!(got, &ids[1..3]);

    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn unpaginated_listing_returns_everything() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();
    let ids = seed_users(&mut exec, 3).await;

    let rows: Vec<User> = run_query(exec.conn(), USERS_QUERY, &[]).await.unwrap();
    assert_eq!(rows.len(), ids.len());

    exec.rollback().await.unwrap();
}

/// The compiled predicate must select exactly the rows the row-by-row
/// evaluator accepts, for a population of users and a mix of access shapes.
#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn compiled_predicate_matches_row_by_row_evaluation() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();
    let ids = seed_users(&mut exec, 6).await;

    let access_sets: Vec<Vec<String>> = vec![
        // nothing
        vec![],
        // one literal user
        vec![format!("{REALM}:v2.user.......{}:r....", ids[2])],
        // two literals, one write-only (write-only must not widen reads)
        vec![
            format!("{REALM}:v2.user.......{}:r....", ids[0]),
            format!("{REALM}:v2.user.......{}:w....", ids[1]),
        ],
        // wildcard over every user
        vec![format!("{REALM}:v2.user.......*:*....")],
        // a scope for a different entity type
        vec![format!("{REALM}:v2.role......{}.:r....", Uuid::new_v4())],
        // self selector
        vec![format!("{REALM}:v2.user.equal.self:r....")],
    ];

    for access in &access_sets {
        // an acting identity whose effective access is exactly `access`
        let acting_user = seed_user(&mut exec, "acting").await;
        seed_role(&mut exec, access, &[acting_user]).await;
        let authz_id = seed_authorization(&mut exec, acting_user, None, access).await;
        let acting = exec.authorization(authz_id).await.unwrap();
        let current = CurrentIds::for_authorization(&mut exec, &acting).await.unwrap();
        let resolved = acting.access(&mut exec, &current).await.unwrap();

        let rule = IsAccessibleByRule::new(
            REALM,
            EntityKind::User,
            &resolved,
            Some(acting_user),
        );
        let rules: Vec<&dyn Rule> = vec![&rule];
        let selected: Vec<User> = run_query(exec.conn(), USERS_QUERY, &rules)
            .await
            .unwrap();
        let selected: std::collections::HashSet<Uuid> =
            selected.iter().map(|u| u.id).collect();

        let action = UserAction {
            basic: AxisValue::Read,
        };
        let mut expected = std::collections::HashSet::new();
        let all_users: Vec<User> =
            run_query(exec.conn(), USERS_QUERY, &[]).await.unwrap();
        for user in &all_users {
            if user
                .is_accessible_by(REALM, Some(&acting), &mut exec, &action)
                .await
                .unwrap()
            {
                expected.insert(user.id);
            }
        }

        assert_eq!(selected, expected, "access set: {access:?}");
    }

    exec.rollback().await.unwrap();
}
