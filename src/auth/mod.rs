//! Authentication Module
//! Mission: Bearer-token authentication, revocation and role-based access

pub mod api;
pub mod gate;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod revocation;
pub mod user_store;

pub use api::AuthState;
pub use gate::{authorization_gate, AccessDenied, AccessPolicy, PolicyTable};
pub use jwt::{JwtHandler, TokenError};
pub use middleware::{
    auth_middleware, extract_principal, AuthFailure, Authenticator, CurrentPrincipal,
};
pub use models::{Principal, Role};
pub use revocation::RevocationStore;
pub use user_store::{CredentialVerifier, UserLookup, UserStore};
