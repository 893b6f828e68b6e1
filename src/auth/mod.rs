//! Authentication and access control.

mod error;
mod flow;
mod guard;
mod password;
mod store;
mod tokens;

pub use error::{AuthError, AuthResult};
pub use flow::{normalize_email, AuthFlow, Session};
pub use guard::{
    authenticate, bearer_token, require_active_status, require_role, AdminOnly, Authorized,
    Principal, RolePolicy,
};
pub use password::{hash_password, verify_password, warm_dummy_hash};
pub use store::{CredentialStore, SqliteCredentialStore, UserChanges};
pub use tokens::{hash_token, Claims, TokenKind, TokenService};
