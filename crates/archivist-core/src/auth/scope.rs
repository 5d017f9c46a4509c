//! Scoped access to the session store.
//!
//! A front end installs its `SessionStore` around the code that needs it with
//! [`scope`] (async) or [`sync_scope`]; anything running inside reaches the
//! store through [`current`] without threading it through every call.
//! Using [`current`] outside a scope is a bug and panics immediately.

use std::future::Future;
use std::sync::Arc;

use super::session::SessionStore;

tokio::task_local! {
    static CURRENT_SESSION: Arc<SessionStore>;
}

/// Run `fut` with `store` installed as the current session
pub async fn scope<F>(store: Arc<SessionStore>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_SESSION.scope(store, fut).await
}

/// Run `f` synchronously with `store` installed as the current session
pub fn sync_scope<F, R>(store: Arc<SessionStore>, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_SESSION.sync_scope(store, f)
}

/// The session installed by the enclosing scope.
///
/// # Panics
///
/// Panics when called outside [`scope`] or [`sync_scope`].
pub fn current() -> Arc<SessionStore> {
    match try_current() {
        Some(store) => store,
        None => panic!("auth::current() must be called within an auth::scope"),
    }
}

/// The session installed by the enclosing scope, if there is one
pub fn try_current() -> Option<Arc<SessionStore>> {
    CURRENT_SESSION.try_with(Arc::clone).ok()
}
