//! Session store: the single source of truth for "who is logged in".
//!
//! State lives in a `watch` channel so front ends can subscribe to every
//! change. The current user is mirrored to a `KeyValueStore` under
//! [`USER_KEY`] after each successful login or explicit update, and removed
//! on logout.
//!
//! Concurrent operations are not serialized: if two logins overlap, the one
//! that settles last determines the final user and error. `loading` counts
//! in-flight operations and only clears when the last one settles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::backend::{AuthBackend, NewUser, DEFAULT_ROLE};
use crate::models::User;
use crate::storage::KeyValueStore;

/// Durable key holding the JSON-encoded current user
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SessionState {
    /// A fresh session is loading until `restore` completes
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
            error: None,
        }
    }
}

/// Tracks one in-flight operation. `loading` stays true while any guard is
/// alive and is cleared when the last one drops, including when a caller
/// drops the future mid-flight.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<SessionState>,
    in_flight: &'a AtomicUsize,
}

impl<'a> LoadingGuard<'a> {
    fn begin(store: &'a SessionStore, clear_error: bool) -> Self {
        // Counter updates happen under the channel's write lock so that
        // `loading` always reflects the count
        store.state.send_modify(|s| {
            store.in_flight.fetch_add(1, Ordering::SeqCst);
            s.loading = true;
            if clear_error {
                s.error = None;
            }
        });
        Self {
            state: &store.state,
            in_flight: &store.in_flight,
        }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let in_flight = self.in_flight;
        self.state.send_modify(|s| {
            let remaining = in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            s.loading = remaining > 0;
        });
    }
}

pub struct SessionStore {
    backend: Arc<dyn AuthBackend>,
    storage: Arc<dyn KeyValueStore>,
    state: watch::Sender<SessionState>,
    in_flight: AtomicUsize,
}

impl SessionStore {
    /// Create a store in its initial loading state. Call `restore` next.
    pub fn new(backend: Arc<dyn AuthBackend>, storage: Arc<dyn KeyValueStore>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            storage,
            state,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a store and restore the persisted user
    pub fn open(backend: Arc<dyn AuthBackend>, storage: Arc<dyn KeyValueStore>) -> Self {
        let store = Self::new(backend, storage);
        store.restore();
        store
    }

    // ===== State Access =====

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    /// True while any restore, login or signup is in flight
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().user.is_some()
    }

    /// Receive every subsequent state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ===== Operations =====

    /// Load the persisted user, if any.
    ///
    /// Undecodable data is deleted and treated as no user; neither that nor a
    /// storage read failure is surfaced to the caller.
    pub fn restore(&self) {
        let _loading = LoadingGuard::begin(self, false);

        let stored = match self.storage.get(USER_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read stored user");
                None
            }
        };

        let user = stored.and_then(|raw| match serde_json::from_str::<User>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Discarding undecodable stored user");
                if let Err(e) = self.storage.remove(USER_KEY) {
                    warn!(error = %e, "Failed to remove stored user");
                }
                None
            }
        });

        debug!(restored = user.is_some(), "Session restored");
        self.state.send_modify(|s| s.user = user);
    }

    /// Authenticate and make the returned user current.
    ///
    /// On failure the message is recorded in `error` and the same error is
    /// returned; the current user and the durable entry are left alone.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<User> {
        let _loading = LoadingGuard::begin(self, true);

        match self.backend.login_user(identifier, secret).await {
            Ok(user) => {
                self.set_user(user.clone());
                info!(user_id = %user.id, "Login successful");
                Ok(user)
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Create an account with the default role.
    ///
    /// Signing up does not log in: the current user and the durable entry
    /// are untouched on success.
    pub async fn signup(
        &self,
        name: &str,
        identifier: &str,
        secret: &str,
        avatar: Option<&str>,
    ) -> Result<()> {
        let _loading = LoadingGuard::begin(self, true);

        let new_user = NewUser {
            name: name.to_string(),
            email: identifier.to_string(),
            password: secret.to_string(),
            role: DEFAULT_ROLE.to_string(),
            avatar: avatar.map(str::to_string),
        };

        match self.backend.create_user(new_user).await {
            Ok(()) => {
                info!(identifier, "Account created");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Signup failed");
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Forget the current user, in memory and on disk. No network call.
    pub fn logout(&self) {
        self.state.send_modify(|s| s.user = None);
        if let Err(e) = self.storage.remove(USER_KEY) {
            warn!(error = %e, "Failed to remove stored user");
        }
        info!("Logged out");
    }

    /// Replace the current user and persist it, whether or not anyone was
    /// logged in.
    pub fn update_current_user(&self, user: User) {
        debug!(user_id = %user.id, "Updating current user");
        self.set_user(user);
    }

    fn set_user(&self, user: User) {
        self.persist(&user);
        self.state.send_modify(|s| s.user = Some(user));
    }

    /// Write-through to durable storage. Failures are logged; the in-memory
    /// state stays authoritative.
    fn persist(&self, user: &User) {
        let result = serde_json::to_string(user)
            .map_err(anyhow::Error::from)
            .and_then(|encoded| self.storage.set(USER_KEY, &encoded));
        if let Err(e) = result {
            warn!(error = %e, "Failed to save user");
        }
    }

    fn record_error(&self, e: &anyhow::Error) {
        let message = e.to_string();
        self.state.send_modify(|s| s.error = Some(message));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::backend::HttpAuthBackend;
    use crate::storage::MemoryStore;
    use crate::test_support::serve_once;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted backend: returns the configured outcome and records calls
    #[derive(Default)]
    struct FakeBackend {
        login_result: Mutex<Option<std::result::Result<User, String>>>,
        create_error: Mutex<Option<String>>,
        created: Mutex<Vec<NewUser>>,
        loading_seen: Mutex<Option<watch::Receiver<SessionState>>>,
        loading_during_call: Mutex<Vec<bool>>,
    }

    impl FakeBackend {
        fn logging_in_as(user: User) -> Self {
            let backend = Self::default();
            *backend.login_result.lock().unwrap() = Some(Ok(user));
            backend
        }

        fn failing_login(message: &str) -> Self {
            let backend = Self::default();
            *backend.login_result.lock().unwrap() = Some(Err(message.to_string()));
            backend
        }

        fn note_loading(&self) {
            if let Some(rx) = self.loading_seen.lock().unwrap().as_ref() {
                let loading = rx.borrow().loading;
                self.loading_during_call.lock().unwrap().push(loading);
            }
        }
    }

    #[async_trait]
    impl AuthBackend for FakeBackend {
        async fn login_user(&self, _identifier: &str, _secret: &str) -> Result<User> {
            self.note_loading();
            match self.login_result.lock().unwrap().clone() {
                Some(Ok(user)) => Ok(user),
                Some(Err(message)) => Err(anyhow::anyhow!(message)),
                None => Err(anyhow::anyhow!("no login scripted")),
            }
        }

        async fn create_user(&self, user: NewUser) -> Result<()> {
            self.note_loading();
            self.created.lock().unwrap().push(user);
            match self.create_error.lock().unwrap().clone() {
                Some(message) => Err(anyhow::anyhow!(message)),
                None => Ok(()),
            }
        }
    }

    fn ada() -> User {
        let mut user = User::new("42");
        user.name = Some("Ada".to_string());
        user.email = Some("ada@example.com".to_string());
        user
    }

    fn store_with(backend: FakeBackend) -> (Arc<FakeBackend>, Arc<MemoryStore>, SessionStore) {
        let backend = Arc::new(backend);
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::new(backend.clone(), storage.clone());
        *backend.loading_seen.lock().unwrap() = Some(store.subscribe());
        (backend, storage, store)
    }

    fn stored_user(storage: &MemoryStore) -> Option<User> {
        storage
            .get(USER_KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).expect("stored user should decode"))
    }

    // -------------------------------------------------------------------------
    // restore
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_store_starts_loading() {
        let (_backend, _storage, store) = store_with(FakeBackend::default());
        assert!(store.is_loading());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_restore_without_entry() {
        let (_backend, _storage, store) = store_with(FakeBackend::default());
        store.restore();
        assert!(store.user().is_none());
        assert!(!store.is_loading());
    }

    #[test]
    fn test_restore_with_corrupt_entry_discards_it() {
        let (_backend, storage, store) = store_with(FakeBackend::default());
        storage.set(USER_KEY, "{not json").unwrap();

        store.restore();

        assert!(store.user().is_none());
        assert!(!store.is_loading());
        assert!(store.error().is_none());
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_restore_with_wrong_shape_discards_it() {
        let (_backend, storage, store) = store_with(FakeBackend::default());
        storage.set(USER_KEY, r#"{"name": "no id"}"#).unwrap();

        store.restore();

        assert!(store.user().is_none());
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_restore_with_null_id_discards_it() {
        let (_backend, storage, store) = store_with(FakeBackend::default());
        storage.set(USER_KEY, r#"{"id": null, "name": "x"}"#).unwrap();

        store.restore();

        assert!(store.user().is_none());
        assert!(!store.is_authenticated());
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_restore_valid_entry() {
        let (_backend, storage, store) = store_with(FakeBackend::default());
        storage.set(USER_KEY, &serde_json::to_string(&ada()).unwrap()).unwrap();

        store.restore();

        assert_eq!(store.user(), Some(ada()));
        assert!(store.is_authenticated());
        assert!(!store.is_loading());
    }

    #[test]
    fn test_open_restores() {
        let backend = Arc::new(FakeBackend::default());
        let storage = Arc::new(MemoryStore::new());
        storage.set(USER_KEY, &serde_json::to_string(&ada()).unwrap()).unwrap();

        let store = SessionStore::open(backend, storage);
        assert_eq!(store.user(), Some(ada()));
        assert!(!store.is_loading());
    }

    // -------------------------------------------------------------------------
    // login
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_success_sets_and_persists_user() {
        let (backend, storage, store) = store_with(FakeBackend::logging_in_as(ada()));
        store.restore();

        let user = store.login("ada@example.com", "pw").await.unwrap();

        assert_eq!(user, ada());
        assert_eq!(store.user(), Some(ada()));
        assert_eq!(stored_user(&storage), Some(ada()));
        assert!(!store.is_loading());
        assert!(store.error().is_none());
        assert_eq!(*backend.loading_during_call.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_login_replaces_previous_user_without_merge() {
        let mut grace = User::new("7");
        grace.name = Some("Grace".to_string());
        let (_backend, storage, store) = store_with(FakeBackend::logging_in_as(grace.clone()));
        store.update_current_user(ada());

        store.login("grace@example.com", "pw").await.unwrap();

        let current = store.user().unwrap();
        assert_eq!(current, grace);
        assert!(current.email.is_none());
        assert_eq!(stored_user(&storage), Some(grace));
    }

    #[tokio::test]
    async fn test_login_failure_keeps_user_and_records_error() {
        let (backend, storage, store) = store_with(FakeBackend::failing_login("Invalid credentials"));
        store.update_current_user(ada());

        let err = store.login("ada@example.com", "wrong").await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid credentials");
        assert_eq!(store.error().as_deref(), Some("Invalid credentials"));
        assert_eq!(store.user(), Some(ada()));
        assert_eq!(stored_user(&storage), Some(ada()));
        assert!(!store.is_loading());
        assert_eq!(*backend.loading_during_call.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_login_reply_without_id_is_a_failure() {
        let (url, server) = serve_once(200, r#"{"id": null, "name": "x"}"#).await;
        let storage = Arc::new(MemoryStore::new());
        let store = SessionStore::open(Arc::new(HttpAuthBackend::new(url).unwrap()), storage.clone());

        assert!(store.login("x@example.com", "pw").await.is_err());
        server.await.unwrap();

        assert!(store.user().is_none());
        assert!(store.error().is_some());
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_login_clears_previous_error() {
        let (backend, _storage, store) = store_with(FakeBackend::failing_login("nope"));
        store.restore();
        let _ = store.login("a", "b").await;
        assert_eq!(store.error().as_deref(), Some("nope"));

        *backend.login_result.lock().unwrap() = Some(Ok(ada()));
        store.login("a", "c").await.unwrap();
        assert!(store.error().is_none());
    }

    /// Backend whose calls never complete
    struct StalledBackend;

    #[async_trait]
    impl AuthBackend for StalledBackend {
        async fn login_user(&self, _identifier: &str, _secret: &str) -> Result<User> {
            futures::future::pending().await
        }

        async fn create_user(&self, _user: NewUser) -> Result<()> {
            futures::future::pending().await
        }
    }

    fn stalled_store() -> SessionStore {
        SessionStore::open(Arc::new(StalledBackend), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_abandoned_login_clears_loading() {
        let store = stalled_store();
        assert!(!store.is_loading());

        {
            let fut = store.login("a", "b");
            futures::pin_mut!(fut);
            assert!(futures::poll!(fut.as_mut()).is_pending());
            assert!(store.is_loading());
        }

        assert!(!store.is_loading());
        assert!(store.user().is_none());
    }

    #[tokio::test]
    async fn test_unpolled_login_never_sets_loading() {
        let store = stalled_store();
        let fut = store.login("a", "b");
        assert!(!store.is_loading());
        drop(fut);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_loading_stays_true_while_any_operation_is_in_flight() {
        let store = stalled_store();

        let mut login = Box::pin(store.login("a", "b"));
        let mut signup = Box::pin(store.signup("Ada", "ada@example.com", "pw", None));
        assert!(futures::poll!(login.as_mut()).is_pending());
        assert!(futures::poll!(signup.as_mut()).is_pending());
        assert!(store.is_loading());

        drop(login);
        assert!(store.is_loading());

        drop(signup);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_restore_during_login_keeps_loading() {
        let store = stalled_store();

        let mut login = Box::pin(store.login("a", "b"));
        assert!(futures::poll!(login.as_mut()).is_pending());

        store.restore();
        assert!(store.is_loading());

        drop(login);
        assert!(!store.is_loading());
    }

    // -------------------------------------------------------------------------
    // signup
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_signup_does_not_establish_session() {
        let (backend, storage, store) = store_with(FakeBackend::default());
        store.restore();

        store
            .signup("Ada", "ada@example.com", "pw", Some("https://example.com/a.png"))
            .await
            .unwrap();

        assert!(store.user().is_none());
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
        assert!(!store.is_loading());

        let created = backend.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].role, DEFAULT_ROLE);
        assert_eq!(created[0].email, "ada@example.com");
        assert_eq!(created[0].avatar.as_deref(), Some("https://example.com/a.png"));
    }

    #[tokio::test]
    async fn test_signup_leaves_existing_session_alone() {
        let (_backend, storage, store) = store_with(FakeBackend::default());
        store.update_current_user(ada());

        store.signup("Grace", "grace@example.com", "pw", None).await.unwrap();

        assert_eq!(store.user(), Some(ada()));
        assert_eq!(stored_user(&storage), Some(ada()));
    }

    #[tokio::test]
    async fn test_signup_failure_records_error() {
        let backend = FakeBackend::default();
        *backend.create_error.lock().unwrap() = Some("Email already registered".to_string());
        let (backend, _storage, store) = store_with(backend);
        store.restore();

        let err = store.signup("Ada", "ada@example.com", "pw", None).await.unwrap_err();

        assert_eq!(err.to_string(), "Email already registered");
        assert_eq!(store.error().as_deref(), Some("Email already registered"));
        assert!(store.user().is_none());
        assert!(!store.is_loading());
        assert_eq!(*backend.loading_during_call.lock().unwrap(), vec![true]);
    }

    // -------------------------------------------------------------------------
    // logout / update
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_logout_clears_user_and_entry() {
        let (_backend, storage, store) = store_with(FakeBackend::logging_in_as(ada()));
        store.login("ada@example.com", "pw").await.unwrap();

        store.logout();

        assert!(store.user().is_none());
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_logout_when_logged_out() {
        let (_backend, storage, store) = store_with(FakeBackend::default());
        store.restore();
        store.logout();
        assert!(store.user().is_none());
        assert_eq!(storage.get(USER_KEY).unwrap(), None);
    }

    #[test]
    fn test_update_current_user_persists_unconditionally() {
        let (_backend, storage, store) = store_with(FakeBackend::default());
        store.restore();
        assert!(!store.is_authenticated());

        store.update_current_user(ada());

        assert_eq!(store.user(), Some(ada()));
        assert_eq!(stored_user(&storage), Some(ada()));
    }

    #[test]
    fn test_subscribers_see_changes() {
        let (_backend, _storage, store) = store_with(FakeBackend::default());
        let mut rx = store.subscribe();
        store.restore();
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().loading);

        store.update_current_user(ada());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().user, Some(ada()));
    }
}
