//! Permission-evaluation support: the placeholder map built from the acting
//! authorization, and the relational selector probes layered above plain
//! scope containment.
//!
//! Selector scopes use a short context (`realm:v2.<type>.<selector>:<action>`)
//! whose arity keeps them disjoint from full codec-built scopes:
//!
//! - `equal.self`   - the target's user is the acting user
//! - `equal.lesser` - the acting user's access strictly contains the target
//!   user's access
//! - `equal.*`      - the acting user's access contains the target user's
//!   access (and, being a wildcard segment, also satisfies both probes above)
//! - `assigned`     - the acting user is one of the owning client's assigned
//!   users (checked by the entity models, which know the client in question)

use std::collections::HashMap;

use service_core::error::AppError;
use uuid::Uuid;

use crate::executor::Executor;
use crate::models::Authorization;
use crate::scope::{matching, EntityKind, SCOPE_VERSION};

/// The `{current_*_id}` values for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentIds {
    pub authorization_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub grant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl CurrentIds {
    /// No acting identity; every placeholder scope drops out.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Placeholders for a user evaluated in isolation (used when comparing a
    /// target user's access against the acting user's).
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Placeholders for the acting authorization, resolving the client
    /// through its grant when one is attached.
    pub async fn for_authorization(
        exec: &mut Executor,
        authorization: &Authorization,
    ) -> Result<Self, AppError> {
        let client_id = match authorization.grant_id {
            Some(grant_id) => Some(exec.grant(grant_id).await?.client_id),
            None => None,
        };
        Ok(Self {
            authorization_id: Some(authorization.id),
            client_id,
            grant_id: authorization.grant_id,
            user_id: Some(authorization.user_id),
        })
    }

    /// The substitution map consumed by [`matching::inject`].
    pub fn injection_values(&self) -> HashMap<String, Option<String>> {
        HashMap::from([
            (
                "current_authorization_id".to_string(),
                self.authorization_id.map(|id| id.to_string()),
            ),
            (
                "current_client_id".to_string(),
                self.client_id.map(|id| id.to_string()),
            ),
            (
                "current_grant_id".to_string(),
                self.grant_id.map(|id| id.to_string()),
            ),
            (
                "current_user_id".to_string(),
                self.user_id.map(|id| id.to_string()),
            ),
        ])
    }
}

/// The selector scope an access set must contain for the given relational
/// predicate to apply.
pub(crate) fn selector_probe(
    realm: &str,
    kind: EntityKind,
    selector: &str,
    action: &str,
) -> String {
    format!("{realm}:{SCOPE_VERSION}.{}.{selector}:{action}", kind.as_str())
}

/// Evaluate the `equal.*` selector family for an entity owned by
/// `target_user_id`. The comparison uses each user's full access set,
/// resolved with that user's own id as `current_user_id`.
pub(crate) async fn user_selectors_allow(
    realm: &str,
    exec: &mut Executor,
    acting: &Authorization,
    access: &[String],
    kind: EntityKind,
    target_user_id: Uuid,
    action: &str,
) -> Result<bool, AppError> {
    if matching::set_contains(access, &selector_probe(realm, kind, "equal.self", action))
        && acting.user_id == target_user_id
    {
        return Ok(true);
    }

    let lesser = matching::set_contains(access, &selector_probe(realm, kind, "equal.lesser", action));
    let contains = matching::set_contains(access, &selector_probe(realm, kind, "equal.*", action));
    if !lesser && !contains {
        return Ok(false);
    }

    let acting_user = exec.user(acting.user_id).await?;
    let acting_access = acting_user
        .access(exec, &CurrentIds::for_user(acting.user_id))
        .await?;
    let target_user = exec.user(target_user_id).await?;
    let target_access = target_user
        .access(exec, &CurrentIds::for_user(target_user_id))
        .await?;

    if contains && matching::set_is_superset(&acting_access, &target_access) {
        return Ok(true);
    }
    if lesser && matching::set_is_strict_superset(&acting_access, &target_access) {
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_probe_shape() {
        assert_eq!(
            selector_probe("authx", EntityKind::User, "equal.self", "r...."),
            "authx:v2.user.equal.self:r...."
        );
        assert_eq!(
            selector_probe("authx", EntityKind::Client, "assigned", "r...w."),
            "authx:v2.client.assigned:r...w."
        );
    }

    #[test]
    fn test_equal_wildcard_grants_every_probe() {
        let access = vec!["authx:v2.user.equal.*:r....".to_string()];
        for selector in ["equal.self", "equal.lesser", "equal.*"] {
            let probe = selector_probe("authx", EntityKind::User, selector, "r....");
            assert!(matching::set_contains(&access, &probe), "{selector}");
        }
    }

    #[test]
    fn test_full_wildcard_scope_does_not_grant_selectors() {
        // the all-* admin scope has codec arity and must not leak into the
        // selector grammar
        let access = vec!["authx:v2.*.*.*.*.*.*.*.*:*.*.*.*.*".to_string()];
        let probe = selector_probe("authx", EntityKind::User, "equal.self", "r....");
        assert!(!matching::set_contains(&access, &probe));
    }

    #[test]
    fn test_injection_values() {
        let user_id = Uuid::new_v4();
        let current = CurrentIds::for_user(user_id);
        let values = current.injection_values();
        assert_eq!(
            values["current_user_id"],
            Some(user_id.to_string())
        );
        assert_eq!(values["current_grant_id"], None);
    }
}
