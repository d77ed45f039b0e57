//! Scope capability strings: the matching algebra and the typed codec.

pub mod codec;
pub mod matching;

pub use codec::{
    decode_context, encode_action, encode_context, encode_scope, AuthorityAction, AuthorityContext,
    AuthorizationAction, AuthorizationContext, AxisValue, ClientAction, ClientContext,
    CredentialAction, CredentialContext, DecodedContext, EntityKind, GrantAction, GrantContext,
    Placeholder, RoleAction, RoleContext, ScopeAction, ScopeContext, Slot, UserAction,
    UserContext, SCOPE_VERSION, SLOT_NAMES,
};
