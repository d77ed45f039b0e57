pub mod authority;
pub mod authorization;
pub mod client;
pub mod credential;
pub mod grant;
pub mod role;
pub mod user;

pub use authority::{Authority, AuthorityData};
pub use authorization::{Authorization, AuthorizationData};
pub use client::{Client, ClientData};
pub use credential::{Credential, CredentialData};
pub use grant::{Grant, GrantData};
pub use role::{Role, RoleData};
pub use user::{User, UserData, UserKind};

use crate::rules::HasId;
use uuid::Uuid;

impl HasId for Authority {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for Authorization {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for Client {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for Credential {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for Grant {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for Role {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for User {
    fn id(&self) -> Uuid {
        self.id
    }
}
