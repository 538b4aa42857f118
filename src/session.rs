//! Session store: the single owner of "who is signed in".
//!
//! SYSTEM CONTEXT
//! ==============
//! Views read snapshots and subscribe to changes; the router's guard asks the
//! provider directly. Only this module calls the provider's credential
//! operations.
//!
//! DESIGN
//! ======
//! `SessionStore` is a cheap `Clone` handle over shared state. Every
//! operation brackets itself with `loading = true` / `loading = false` and
//! clears `error` on entry. The bracket is a drop guard, so `loading` also
//! resolves if the caller drops the future mid-flight.
//!
//! Concurrent operations are not serialized. Each owns its own bracket, and
//! whichever finishes last decides `user`, `loading` and `error`.
//!
//! The store mirrors provider pushes into `user` for its whole lifetime. The
//! push callback holds a weak reference, and [`SessionStore::teardown`]
//! releases the subscription explicitly.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{AuthError, ErrorCode, ProviderError};
use crate::observe::{CallbackRegistry, Subscription};
use crate::provider::{AuthResponse, IdentityProvider, SessionChange, User};

/// Fixed user-facing failure messages, one per operation.
pub mod messages {
    pub const CHECK_SESSION_FAILED: &str = "Something went wrong while checking your session.";
    pub const LOGIN_FAILED: &str = "Login failed. Please check your email and password.";
    pub const REGISTER_FAILED: &str = "Registration failed.";
    pub const LOGOUT_FAILED: &str = "Something went wrong while logging out.";
}

// =============================================================================
// STATE
// =============================================================================

/// Point-in-time copy of the store's observable fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// Derived from `user`; never stored.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl Default for SessionSnapshot {
    /// A fresh store is loading until the first session check settles.
    fn default() -> Self {
        Self { user: None, loading: true, error: None }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Bound for each provider call. `None` waits as long as the provider
    /// takes.
    pub operation_timeout: Option<Duration>,
}

impl StoreOptions {
    #[must_use]
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self { operation_timeout: config.operation_timeout }
    }
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    state: Mutex<SessionSnapshot>,
    observers: CallbackRegistry<SessionSnapshot>,
    push: Mutex<Option<Subscription>>,
    options: StoreOptions,
}

impl Inner {
    /// Apply `f` under the lock, then notify observers with the result.
    fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut state);
            state.clone()
        };
        self.observers.emit(&snapshot);
    }

    fn begin(&self) -> LoadingGuard<'_> {
        self.update(|s| {
            s.loading = true;
            s.error = None;
        });
        LoadingGuard { inner: self }
    }

    fn fail(&self, message: &str) {
        self.update(|s| s.error = Some(message.to_owned()));
    }

    fn mirror(&self, change: &SessionChange) {
        tracing::debug!(event = ?change.event, present = change.session.is_some(), "mirroring session push");
        let user = change.session.as_ref().map(|s| s.user.clone());
        self.update(|s| s.user = user);
    }

    async fn bounded<T, E, Fut>(&self, call: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: From<ProviderError>,
    {
        match self.options.operation_timeout {
            None => call.await,
            Some(after) => tokio::time::timeout(after, call)
                .await
                .unwrap_or_else(|_| Err(ProviderError::Timeout { after }.into())),
        }
    }
}

/// Resets `loading` when the operation ends, however it ends.
struct LoadingGuard<'a> {
    inner: &'a Inner,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.update(|s| s.loading = false);
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Explicitly owned session context. Clone to share.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Create an empty, loading store and subscribe it to provider pushes.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, options: StoreOptions) -> Self {
        let inner = Arc::new(Inner {
            provider,
            state: Mutex::new(SessionSnapshot::default()),
            observers: CallbackRegistry::new(),
            push: Mutex::new(None),
            options,
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let subscription = inner.provider.on_session_changed(Box::new(move |change: &SessionChange| {
            if let Some(inner) = weak.upgrade() {
                inner.mirror(change);
            }
        }));
        *inner.push.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        Self { inner }
    }

    /// Create the store and run the initial hydration.
    pub async fn start(provider: Arc<dyn IdentityProvider>, options: StoreOptions) -> Self {
        let store = Self::new(provider, options);
        store.check_session().await;
        store
    }

    /// Release the provider push subscription. Idempotent.
    pub fn teardown(&self) {
        let subscription = self
            .inner
            .push
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            tracing::debug!("session store detached from provider");
        }
    }

    // -------------------------------------------------------------------------
    // readers
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.snapshot().user
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.snapshot().loading
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.snapshot().error
    }

    #[must_use]
    pub fn provider(&self) -> Arc<dyn IdentityProvider> {
        Arc::clone(&self.inner.provider)
    }

    /// Call `observer` with a fresh snapshot after every state change.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&SessionSnapshot) + Send + Sync + 'static,
    {
        self.inner.observers.register(observer)
    }

    // -------------------------------------------------------------------------
    // operations
    // -------------------------------------------------------------------------

    /// Hydrate `user` from the provider's current session.
    ///
    /// A missing session leaves `user` as it is. Failures land in `error`
    /// and are never returned.
    pub async fn check_session(&self) {
        let inner = &*self.inner;
        let _loading = inner.begin();

        match inner.bounded(inner.provider.get_current_session()).await {
            Ok(Some(session)) => inner.update(|s| s.user = Some(session.user)),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, code = e.error_code(), "session check failed");
                inner.fail(messages::CHECK_SESSION_FAILED);
            }
        }
    }

    /// Password sign-in.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] after recording
    /// [`messages::LOGIN_FAILED`] in `error`.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError> {
        let inner = &*self.inner;
        let _loading = inner.begin();

        match inner
            .bounded(inner.provider.sign_in_with_password(identifier, secret))
            .await
        {
            Ok(response) => {
                let user = response.user.clone();
                inner.update(|s| s.user = user);
                Ok(response)
            }
            Err(e) => {
                tracing::error!(error = %e, code = e.error_code(), "login failed");
                inner.fail(messages::LOGIN_FAILED);
                Err(e)
            }
        }
    }

    /// Account creation. Does not sign the user in.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] after recording
    /// [`messages::REGISTER_FAILED`] in `error`.
    pub async fn register(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError> {
        let inner = &*self.inner;
        let _loading = inner.begin();

        match inner.bounded(inner.provider.sign_up(identifier, secret)).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!(error = %e, code = e.error_code(), "registration failed");
                inner.fail(messages::REGISTER_FAILED);
                Err(e)
            }
        }
    }

    /// Sign out. Failures are recorded in `error` and never returned.
    pub async fn logout(&self) {
        let inner = &*self.inner;
        let _loading = inner.begin();

        match inner.bounded(inner.provider.sign_out()).await {
            Ok(()) => inner.update(|s| s.user = None),
            Err(e) => {
                tracing::error!(error = %e, code = e.error_code(), "logout failed");
                inner.fail(messages::LOGOUT_FAILED);
            }
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.snapshot())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
