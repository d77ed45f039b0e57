//! Integration tests for effective-access resolution and accessibility
//! checks across the role/grant/authorization cascade.

mod common;

use common::{
    seed_authorization, seed_client, seed_grant, seed_role, seed_user, test_pool, REALM,
};
use identity_service::access::CurrentIds;
use identity_service::models::User;
use identity_service::scope::{AxisValue, ClientAction, GrantAction, UserAction};
use identity_service::store::{ReadOptions, WriteMeta};
use identity_service::Executor;

fn read_basic() -> UserAction {
    UserAction {
        basic: AxisValue::Read,
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn placeholder_role_grants_self_access_only() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let u1 = seed_user(&mut exec, "u1").await;
    let u2 = seed_user(&mut exec, "u2").await;
    seed_role(
        &mut exec,
        &[format!("{REALM}:v2.user.......{{current_user_id}}:r....")],
        &[u1, u2],
    )
    .await;
    let authz_id = seed_authorization(&mut exec, u1, None, &[format!(
        "{REALM}:v2.user.......*:*...."
    )])
    .await;

    let acting = exec.authorization(authz_id).await.unwrap();
    let current = CurrentIds::for_authorization(&mut exec, &acting).await.unwrap();
    let access = acting.access(&mut exec, &current).await.unwrap();
    assert_eq!(access, vec![format!("{REALM}:v2.user.......{u1}:r....")]);

    let user1 = exec.user(u1).await.unwrap();
    let user2 = exec.user(u2).await.unwrap();
    assert!(user1
        .is_accessible_by(REALM, Some(&acting), &mut exec, &read_basic())
        .await
        .unwrap());
    assert!(!user2
        .is_accessible_by(REALM, Some(&acting), &mut exec, &read_basic())
        .await
        .unwrap());

    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn authorization_access_narrows_through_grant() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let user_id = seed_user(&mut exec, "owner").await;
    seed_role(
        &mut exec,
        &[format!("{REALM}:v2.user.......*:*....")],
        &[user_id],
    )
    .await;
    let client_id = seed_client(&mut exec, &[]).await;
    // the user consented to read-only user access for this client
    let grant_id = seed_grant(
        &mut exec,
        client_id,
        user_id,
        &[format!("{REALM}:v2.user.......*:r....")],
    )
    .await;
    let authz_id = seed_authorization(
        &mut exec,
        user_id,
        Some(grant_id),
        &[format!("{REALM}:v2.user.......*:*....")],
    )
    .await;

    let acting = exec.authorization(authz_id).await.unwrap();
    let current = CurrentIds::for_authorization(&mut exec, &acting).await.unwrap();
    let access = acting.access(&mut exec, &current).await.unwrap();
    assert_eq!(access, vec![format!("{REALM}:v2.user.......*:r....")]);

    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn disabling_any_link_zeroes_access() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let user_id = seed_user(&mut exec, "mallory").await;
    seed_role(
        &mut exec,
        &[format!("{REALM}:v2.user.......*:*....")],
        &[user_id],
    )
    .await;
    let authz_id = seed_authorization(&mut exec, user_id, None, &[format!(
        "{REALM}:v2.user.......*:*...."
    )])
    .await;

    let acting = exec.authorization(authz_id).await.unwrap();
    let current = CurrentIds::for_authorization(&mut exec, &acting).await.unwrap();
    assert!(!acting.access(&mut exec, &current).await.unwrap().is_empty());

    // disable the user: the whole cascade collapses to nothing
    let user = User::read(exec.conn(), user_id, &ReadOptions::default())
        .await
        .unwrap();
    let mut data = user.data();
    data.enabled = false;
    exec.write_user(&data, &WriteMeta::new(None)).await.unwrap();

    let access = acting.access(&mut exec, &current).await.unwrap();
    assert!(access.is_empty());

    let target = exec.user(user_id).await.unwrap();
    assert!(!target
        .is_accessible_by(REALM, Some(&acting), &mut exec, &read_basic())
        .await
        .unwrap());

    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn anonymous_caller_is_denied() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();
    let user_id = seed_user(&mut exec, "nobody-sees-me").await;
    let user = exec.user(user_id).await.unwrap();
    assert!(!user
        .is_accessible_by(REALM, None, &mut exec, &read_basic())
        .await
        .unwrap());
    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn assigned_selector_lets_client_owner_read_grants() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let owner = seed_user(&mut exec, "client-owner").await;
    let end_user = seed_user(&mut exec, "end-user").await;
    seed_role(
        &mut exec,
        &[
            format!("{REALM}:v2.client.assigned:r...."),
            format!("{REALM}:v2.grant.assigned:r...."),
        ],
        &[owner],
    )
    .await;
    let client_id = seed_client(&mut exec, &[owner]).await;
    let grant_id = seed_grant(&mut exec, client_id, end_user, &[]).await;
    let authz_id = seed_authorization(&mut exec, owner, None, &[
        format!("{REALM}:v2.client.assigned:r...."),
        format!("{REALM}:v2.grant.assigned:r...."),
    ])
    .await;

    let acting = exec.authorization(authz_id).await.unwrap();
    let client = exec.client(client_id).await.unwrap();
    let grant = exec.grant(grant_id).await.unwrap();

    assert!(client
        .is_accessible_by(
            REALM,
            Some(&acting),
            &mut exec,
            &ClientAction {
                basic: AxisValue::Read,
                secrets: AxisValue::Unset,
            },
        )
        .await
        .unwrap());
    assert!(grant
        .is_accessible_by(
            REALM,
            Some(&acting),
            &mut exec,
            &GrantAction {
                basic: AxisValue::Read,
                scopes: AxisValue::Unset,
                secrets: AxisValue::Unset,
            },
        )
        .await
        .unwrap());

    // writing needs the write axis, which the selector scope does not grant
    assert!(!client
        .is_accessible_by(
            REALM,
            Some(&acting),
            &mut exec,
            &ClientAction {
                basic: AxisValue::Write,
                secrets: AxisValue::Unset,
            },
        )
        .await
        .unwrap());

    exec.rollback().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn equal_lesser_selector_requires_strictly_more_access() {
    let pool = test_pool().await;
    let mut exec = Executor::begin(&pool).await.unwrap();

    let admin = seed_user(&mut exec, "admin").await;
    let peon = seed_user(&mut exec, "peon").await;
    let peer = seed_user(&mut exec, "peer").await;

    seed_role(
        &mut exec,
        &[
            format!("{REALM}:v2.user.equal.lesser:r...."),
            format!("{REALM}:v2.role......*.:r..r.."),
        ],
        &[admin, peer],
    )
    .await;
    seed_role(
        &mut exec,
        &[format!("{REALM}:v2.user.equal.lesser:r....")],
        &[peon],
    )
    .await;

    let authz_id = seed_authorization(&mut exec, admin, None, &[format!(
        "{REALM}:v2.user.equal.lesser:r...."
    )])
    .await;
    let acting = exec.authorization(authz_id).await.unwrap();

    let peon_user = exec.user(peon).await.unwrap();
    assert!(peon_user
        .is_accessible_by(REALM, Some(&acting), &mut exec, &read_basic())
        .await
        .unwrap());

    // a peer with identical access is not "lesser"
    let peer_user = exec.user(peer).await.unwrap();
    assert!(!peer_user
        .is_accessible_by(REALM, Some(&acting), &mut exec, &read_basic())
        .await
        .unwrap());

    exec.rollback().await.unwrap();
}
