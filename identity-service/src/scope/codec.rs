//! Typed codec for the canonical scope grammar.
//!
//! `realm:v2.<entityType>.<authorityId>.<authorizationId>.<clientId>.<credentialId>.<grantId>.<roleId>.<userId>:<basic>.<details>.<scopes>.<secrets>.<users>`
//!
//! Context and action are typed per entity so a slot or axis that is invalid
//! for a type cannot be constructed. The codec never resolves placeholders;
//! that happens in [`super::matching::inject`].

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

pub const SCOPE_VERSION: &str = "v2";

/// Slot names in canonical context order.
pub const SLOT_NAMES: [&str; 7] = [
    "authority_id",
    "authorization_id",
    "client_id",
    "credential_id",
    "grant_id",
    "role_id",
    "user_id",
];

/// Entity type discriminator as it appears in a scope context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Authority,
    Authorization,
    Client,
    Credential,
    Grant,
    Role,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Authority => "authority",
            EntityKind::Authorization => "authorization",
            EntityKind::Client => "client",
            EntityKind::Credential => "credential",
            EntityKind::Grant => "grant",
            EntityKind::Role => "role",
            EntityKind::User => "user",
        }
    }

    /// Mask over [`SLOT_NAMES`] of the context slots this entity type
    /// carries.
    pub fn slot_mask(&self) -> [bool; 7] {
        match self {
            EntityKind::Authority => [true, false, false, false, false, false, false],
            EntityKind::Authorization => [false, true, true, false, true, false, true],
            EntityKind::Client => [false, false, true, false, false, false, false],
            EntityKind::Credential => [true, false, false, true, false, false, true],
            EntityKind::Grant => [false, false, true, false, true, false, true],
            EntityKind::Role => [false, false, false, false, false, true, false],
            EntityKind::User => [false, false, false, false, false, false, true],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authority" => Some(EntityKind::Authority),
            "authorization" => Some(EntityKind::Authorization),
            "client" => Some(EntityKind::Client),
            "credential" => Some(EntityKind::Credential),
            "grant" => Some(EntityKind::Grant),
            "role" => Some(EntityKind::Role),
            "user" => Some(EntityKind::User),
            _ => None,
        }
    }
}

/// Placeholders substituted later by the matching capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    CurrentAuthorizationId,
    CurrentClientId,
    CurrentGrantId,
    CurrentUserId,
}

impl Placeholder {
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::CurrentAuthorizationId => "current_authorization_id",
            Placeholder::CurrentClientId => "current_client_id",
            Placeholder::CurrentGrantId => "current_grant_id",
            Placeholder::CurrentUserId => "current_user_id",
        }
    }
}

/// One positional identifier slot of a scope context.
///
/// `Empty` denotes a new/unspecified instance, `Any` the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Empty,
    Any,
    Id(Uuid),
    Current(Placeholder),
}

impl Slot {
    fn encode(&self) -> String {
        match self {
            Slot::Empty => String::new(),
            Slot::Any => "*".to_string(),
            Slot::Id(id) => id.to_string(),
            Slot::Current(p) => format!("{{{}}}", p.name()),
        }
    }

    fn decode(segment: &str) -> Result<Self, AppError> {
        if segment.is_empty() {
            return Ok(Slot::Empty);
        }
        if segment == "*" {
            return Ok(Slot::Any);
        }
        if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            let placeholder = match name {
                "current_authorization_id" => Placeholder::CurrentAuthorizationId,
                "current_client_id" => Placeholder::CurrentClientId,
                "current_grant_id" => Placeholder::CurrentGrantId,
                "current_user_id" => Placeholder::CurrentUserId,
                other => {
                    return Err(AppError::Validation(format!(
                        "unknown scope placeholder: {other}"
                    )))
                }
            };
            return Ok(Slot::Current(placeholder));
        }
        let id = Uuid::parse_str(segment)
            .map_err(|_| AppError::Validation(format!("invalid id in scope context: {segment}")))?;
        Ok(Slot::Id(id))
    }
}

static EMPTY_SLOT: Slot = Slot::Empty;

/// A typed scope context; implementors expose their valid slots in canonical
/// order, with unused slots always empty.
pub trait ScopeContext {
    const KIND: EntityKind;
    fn slots(&self) -> [&Slot; 7];
}

/// A typed scope action bound to its context type.
///
/// Axes in canonical order: basic, details, scopes, secrets, users. Axes the
/// entity type lacks are always unset.
pub trait ScopeAction: Default {
    type Context: ScopeContext;
    fn axes(&self) -> [AxisValue; 5];
}

/// A single permission axis value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisValue {
    #[default]
    Unset,
    Read,
    Write,
    Any,
}

impl AxisValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxisValue::Unset => "",
            AxisValue::Read => "r",
            AxisValue::Write => "w",
            AxisValue::Any => "*",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityContext {
    pub authority_id: Slot,
}

impl ScopeContext for AuthorityContext {
    const KIND: EntityKind = EntityKind::Authority;
    fn slots(&self) -> [&Slot; 7] {
        [
            &self.authority_id,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub authorization_id: Slot,
    pub client_id: Slot,
    pub grant_id: Slot,
    pub user_id: Slot,
}

impl ScopeContext for AuthorizationContext {
    const KIND: EntityKind = EntityKind::Authorization;
    fn slots(&self) -> [&Slot; 7] {
        [
            &EMPTY_SLOT,
            &self.authorization_id,
            &self.client_id,
            &EMPTY_SLOT,
            &self.grant_id,
            &EMPTY_SLOT,
            &self.user_id,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub client_id: Slot,
}

impl ScopeContext for ClientContext {
    const KIND: EntityKind = EntityKind::Client;
    fn slots(&self) -> [&Slot; 7] {
        [
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &self.client_id,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialContext {
    pub authority_id: Slot,
    pub credential_id: Slot,
    pub user_id: Slot,
}

impl ScopeContext for CredentialContext {
    const KIND: EntityKind = EntityKind::Credential;
    fn slots(&self) -> [&Slot; 7] {
        [
            &self.authority_id,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &self.credential_id,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &self.user_id,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantContext {
    pub client_id: Slot,
    pub grant_id: Slot,
    pub user_id: Slot,
}

impl ScopeContext for GrantContext {
    const KIND: EntityKind = EntityKind::Grant;
    fn slots(&self) -> [&Slot; 7] {
        [
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &self.client_id,
            &EMPTY_SLOT,
            &self.grant_id,
            &EMPTY_SLOT,
            &self.user_id,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleContext {
    pub role_id: Slot,
}

impl ScopeContext for RoleContext {
    const KIND: EntityKind = EntityKind::Role;
    fn slots(&self) -> [&Slot; 7] {
        [
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &self.role_id,
            &EMPTY_SLOT,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: Slot,
}

impl ScopeContext for UserContext {
    const KIND: EntityKind = EntityKind::User;
    fn slots(&self) -> [&Slot; 7] {
        [
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &EMPTY_SLOT,
            &self.user_id,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorityAction {
    pub basic: AxisValue,
    pub details: AxisValue,
}

impl ScopeAction for AuthorityAction {
    type Context = AuthorityContext;
    fn axes(&self) -> [AxisValue; 5] {
        [
            self.basic,
            self.details,
            AxisValue::Unset,
            AxisValue::Unset,
            AxisValue::Unset,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorizationAction {
    pub basic: AxisValue,
    pub scopes: AxisValue,
    pub secrets: AxisValue,
}

impl ScopeAction for AuthorizationAction {
    type Context = AuthorizationContext;
    fn axes(&self) -> [AxisValue; 5] {
        [
            self.basic,
            AxisValue::Unset,
            self.scopes,
            self.secrets,
            AxisValue::Unset,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientAction {
    pub basic: AxisValue,
    pub secrets: AxisValue,
}

impl ScopeAction for ClientAction {
    type Context = ClientContext;
    fn axes(&self) -> [AxisValue; 5] {
        [
            self.basic,
            AxisValue::Unset,
            AxisValue::Unset,
            self.secrets,
            AxisValue::Unset,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialAction {
    pub basic: AxisValue,
    pub details: AxisValue,
}

impl ScopeAction for CredentialAction {
    type Context = CredentialContext;
    fn axes(&self) -> [AxisValue; 5] {
        [
            self.basic,
            self.details,
            AxisValue::Unset,
            AxisValue::Unset,
            AxisValue::Unset,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantAction {
    pub basic: AxisValue,
    pub scopes: AxisValue,
    pub secrets: AxisValue,
}

impl ScopeAction for GrantAction {
    type Context = GrantContext;
    fn axes(&self) -> [AxisValue; 5] {
        [
            self.basic,
            AxisValue::Unset,
            self.scopes,
            self.secrets,
            AxisValue::Unset,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleAction {
    pub basic: AxisValue,
    pub scopes: AxisValue,
    pub users: AxisValue,
}

impl ScopeAction for RoleAction {
    type Context = RoleContext;
    fn axes(&self) -> [AxisValue; 5] {
        [
            self.basic,
            AxisValue::Unset,
            self.scopes,
            AxisValue::Unset,
            self.users,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserAction {
    pub basic: AxisValue,
}

impl ScopeAction for UserAction {
    type Context = UserContext;
    fn axes(&self) -> [AxisValue; 5] {
        [
            self.basic,
            AxisValue::Unset,
            AxisValue::Unset,
            AxisValue::Unset,
            AxisValue::Unset,
        ]
    }
}

/// Encode the context part (`v2.<type>.<slots...>`) of a scope.
pub fn encode_context<C: ScopeContext>(context: &C) -> String {
    let slots = context.slots();
    let mut out = String::with_capacity(64);
    out.push_str(SCOPE_VERSION);
    out.push('.');
    out.push_str(C::KIND.as_str());
    for slot in slots {
        out.push('.');
        out.push_str(&slot.encode());
    }
    out
}

/// Encode the action part (`<basic>.<details>.<scopes>.<secrets>.<users>`).
pub fn encode_action<A: ScopeAction>(action: &A) -> String {
    action
        .axes()
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

/// Encode a full canonical scope string.
pub fn encode_scope<A: ScopeAction>(realm: &str, context: &A::Context, action: &A) -> String {
    format!("{realm}:{}:{}", encode_context(context), encode_action(action))
}

/// A dynamically decoded context, used to validate scope input at the
/// boundary before it reaches the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedContext {
    pub kind: EntityKind,
    pub slots: [Slot; 7],
}

/// Parse and validate the context part of a scope string.
pub fn decode_context(context: &str) -> Result<DecodedContext, AppError> {
    let segments: Vec<&str> = context.split('.').collect();
    if segments.len() != 9 {
        return Err(AppError::Validation(format!(
            "scope context must have 9 segments, got {}",
            segments.len()
        )));
    }
    if segments[0] != SCOPE_VERSION {
        return Err(AppError::Validation(format!(
            "unsupported scope version: {}",
            segments[0]
        )));
    }
    let kind = EntityKind::parse(segments[1]).ok_or_else(|| {
        AppError::Validation(format!("unknown scope entity type: {}", segments[1]))
    })?;
    let mut slots = [Slot::Empty; 7];
    let mask = kind.slot_mask();
    for (i, segment) in segments[2..].iter().enumerate() {
        slots[i] = Slot::decode(segment)?;
        if slots[i] != Slot::Empty && !mask[i] {
            return Err(AppError::Validation(format!(
                "slot {} is not valid for entity type {}",
                SLOT_NAMES[i],
                kind.as_str()
            )));
        }
    }
    Ok(DecodedContext { kind, slots })
}
