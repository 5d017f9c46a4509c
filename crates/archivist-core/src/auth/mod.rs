//! Authentication module for managing the user session and credentials.
//!
//! This module provides:
//! - `SessionStore`: the single source of truth for the current user, with
//!   login/signup/logout/update operations and durable persistence
//! - `scope`/`current`: makes a session store available to a region of code
//! - `AuthBackend`/`HttpAuthBackend`: the remote login and account creation API
//! - `CredentialStore`: archive secret storage in the OS keychain

pub mod backend;
pub mod credentials;
pub mod scope;
pub mod session;

pub use backend::{AuthBackend, HttpAuthBackend, NewUser, DEFAULT_ROLE};
pub use credentials::CredentialStore;
pub use scope::{current, scope, sync_scope, try_current};
pub use session::{SessionState, SessionStore, USER_KEY};
