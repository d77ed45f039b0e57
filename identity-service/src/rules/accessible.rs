//! Accessibility predicate compiler.
//!
//! Evaluating `is_accessible_by` once per row is prohibitively slow for
//! listings, so the caller's already-resolved access set is compiled into a
//! single SQL boolean expression equivalent to the row-by-row check. One
//! divergence is deliberate: the access-comparison selectors (`equal.lesser`,
//! `equal.*`) would require resolving the target user's access per row and
//! are skipped here.

use uuid::Uuid;

use super::{Param, Rule};
use crate::access::selector_probe;
use crate::scope::{matching, EntityKind, SCOPE_VERSION, SLOT_NAMES};

/// How one context slot is checked against a row of this entity type.
#[derive(Debug, Clone, Copy)]
enum SlotPredicate {
    /// The entity type has no such dimension; a scope constraining it can
    /// never select a row.
    Ignore,
    /// Simple column equality on the records table.
    Column(&'static str),
    /// An authorization's client, reachable only through its grant.
    GrantClient,
}

fn slot_predicates(kind: EntityKind) -> [SlotPredicate; 7] {
    use SlotPredicate::*;
    match kind {
        EntityKind::Authority => [Column("entity_id"), Ignore, Ignore, Ignore, Ignore, Ignore, Ignore],
        EntityKind::Authorization => [
            Ignore,
            Column("entity_id"),
            GrantClient,
            Ignore,
            Column("grant_id"),
            Ignore,
            Column("user_id"),
        ],
        EntityKind::Client => [Ignore, Ignore, Column("entity_id"), Ignore, Ignore, Ignore, Ignore],
        EntityKind::Credential => [
            Column("authority_id"),
            Ignore,
            Ignore,
            Column("entity_id"),
            Ignore,
            Ignore,
            Column("user_id"),
        ],
        EntityKind::Grant => [
            Ignore,
            Ignore,
            Column("client_id"),
            Ignore,
            Column("entity_id"),
            Ignore,
            Column("user_id"),
        ],
        EntityKind::Role => [Ignore, Ignore, Ignore, Ignore, Ignore, Column("entity_id"), Ignore],
        EntityKind::User => [Ignore, Ignore, Ignore, Ignore, Ignore, Ignore, Column("entity_id")],
    }
}

/// The column holding the owning user id, for the `equal.self` selector.
fn user_column(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::User => Some("entity_id"),
        EntityKind::Credential | EntityKind::Grant | EntityKind::Authorization => Some("user_id"),
        _ => None,
    }
}

fn extraction_template(realm: &str, kind: EntityKind) -> String {
    let captures: Vec<String> = SLOT_NAMES.iter().map(|name| format!("({name})")).collect();
    // representative read action: basic is the first axis for every type
    format!(
        "{realm}:{SCOPE_VERSION}.{}.{}:r....",
        kind.as_str(),
        captures.join(".")
    )
}

/// Compiled row-accessibility filter for one entity kind.
///
/// No WHERE contribution means the caller has unconditional access; a
/// `FALSE` contribution means the caller sees nothing of this kind.
#[derive(Debug, Clone)]
pub struct IsAccessibleByRule {
    where_sql: Option<String>,
    params: Vec<(String, Param)>,
}

impl IsAccessibleByRule {
    pub fn new(
        realm: &str,
        kind: EntityKind,
        access: &[String],
        acting_user_id: Option<Uuid>,
    ) -> Self {
        let predicates = slot_predicates(kind);
        let template = extraction_template(realm, kind);
        let mut disjuncts: Vec<String> = Vec::new();
        let mut params: Vec<(String, Param)> = Vec::new();

        'matches: for matched in matching::extract(&template, access) {
            let mut conditions: Vec<String> = Vec::new();
            let mut match_params: Vec<(String, Param)> = Vec::new();
            for (index, slot_name) in SLOT_NAMES.iter().enumerate() {
                let bound = matched.captures[*slot_name].as_str();
                match predicates[index] {
                    SlotPredicate::Ignore => {
                        // a constraint on a dimension the type lacks can
                        // never hold for an existing row
                        if !(bound.is_empty() || bound == "*") {
                            continue 'matches;
                        }
                    }
                    SlotPredicate::Column(column) => match bound {
                        "*" => {}
                        value => {
                            let id = match Uuid::parse_str(value) {
                                Ok(id) => id,
                                // empty means "a new instance"; anything else
                                // non-literal cannot select an existing row
                                Err(_) => continue 'matches,
                            };
                            let name = format!("acc_p{}", params.len() + match_params.len());
                            conditions.push(format!("{column} = :{name}"));
                            match_params.push((name, Param::Uuid(id)));
                        }
                    },
                    SlotPredicate::GrantClient => match bound {
                        "*" => {}
                        value => {
                            let id = match Uuid::parse_str(value) {
                                Ok(id) => id,
                                Err(_) => continue 'matches,
                            };
                            let name = format!("acc_p{}", params.len() + match_params.len());
                            conditions.push(format!(
                                "EXISTS (SELECT 1 FROM grant_records g \
                                 WHERE g.replacement_record_id IS NULL \
                                 AND g.entity_id = authorization_records.grant_id \
                                 AND g.client_id = :{name})"
                            ));
                            match_params.push((name, Param::Uuid(id)));
                        }
                    },
                }
            }
            if conditions.is_empty() {
                // unconditional access: no filter needed at all
                return Self {
                    where_sql: None,
                    params: Vec::new(),
                };
            }
            disjuncts.push(conditions.join(" AND "));
            params.extend(match_params);
        }

        if let Some(acting_user_id) = acting_user_id {
            let mut wants_acting_param = false;
            if let Some(column) = user_column(kind) {
                let probe = selector_probe(realm, kind, "equal.self", "r....");
                if matching::set_contains(access, &probe) {
                    disjuncts.push(format!("{column} = :acting_user_id"));
                    wants_acting_param = true;
                }
            }
            let assigned = selector_probe(realm, kind, "assigned", "r....");
            if matching::set_contains(access, &assigned) {
                let condition = match kind {
                    EntityKind::Client => {
                        Some(":acting_user_id = ANY(user_ids)".to_string())
                    }
                    EntityKind::Grant => Some(
                        "EXISTS (SELECT 1 FROM client_records c \
                         WHERE c.replacement_record_id IS NULL \
                         AND c.entity_id = grant_records.client_id \
                         AND :acting_user_id = ANY(c.user_ids))"
                            .to_string(),
                    ),
                    EntityKind::Authorization => Some(
                        "EXISTS (SELECT 1 FROM grant_records g \
                         JOIN client_records c ON c.entity_id = g.client_id \
                         AND c.replacement_record_id IS NULL \
                         WHERE g.replacement_record_id IS NULL \
                         AND g.entity_id = authorization_records.grant_id \
                         AND :acting_user_id = ANY(c.user_ids))"
                            .to_string(),
                    ),
                    _ => None,
                };
                if let Some(condition) = condition {
                    disjuncts.push(condition);
                    wants_acting_param = true;
                }
            }
            if wants_acting_param {
                params.push(("acting_user_id".to_string(), Param::Uuid(acting_user_id)));
            }
        }

        if disjuncts.is_empty() {
            return Self {
                where_sql: Some("FALSE".to_string()),
                params: Vec::new(),
            };
        }

        let where_sql = disjuncts
            .iter()
            .map(|d| format!("({d})"))
            .collect::<Vec<_>>()
            .join(" OR ");
        Self {
            where_sql: Some(where_sql),
            params,
        }
    }

    /// Whether the compiled filter lets every row through.
    pub fn is_unconditional(&self) -> bool {
        self.where_sql.is_none()
    }

    /// Whether the compiled filter can never match a row.
    pub fn matches_nothing(&self) -> bool {
        self.where_sql.as_deref() == Some("FALSE")
    }
}

impl Rule for IsAccessibleByRule {
    fn to_sql_where(&self) -> Option<String> {
        self.where_sql.clone()
    }

    fn to_sql_params(&self) -> Vec<(String, Param)> {
        self.params.clone()
    }
}
