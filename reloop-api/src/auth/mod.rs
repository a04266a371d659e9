//! Authentication: session store and request extractors

pub mod extract;
pub mod session_store;

pub use extract::{bearer_token, require_auth, CurrentUser, MaybeUser};
pub use session_store::{AuthError, AuthSession, Identity, SessionStore};
