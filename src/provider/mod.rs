//! Identity provider capability surface.
//!
//! DESIGN
//! ======
//! The store and guard only ever see `dyn IdentityProvider`. The production
//! implementation is [`gotrue::GoTrueClient`]; tests use the scripted
//! provider in [`test_helpers`].

pub mod gotrue;
pub mod types;

use crate::error::{AuthError, ProviderError};
use crate::observe::Subscription;
pub use types::{AuthResponse, Session, SessionChange, SessionEvent, User};

/// Callback invoked for every provider-side session transition.
pub type SessionCallback = Box<dyn Fn(&SessionChange) + Send + Sync>;

/// Operations the session layer needs from an identity provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current valid session, if any. May refresh an expired token first.
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Password sign-in.
    async fn sign_in_with_password(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError>;

    /// Account creation. A session is only returned when the provider does
    /// not require confirmation.
    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Register for session-change pushes until the handle is dropped.
    fn on_session_changed(&self, callback: SessionCallback) -> Subscription;
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Semaphore;

    use super::*;
    use crate::observe::CallbackRegistry;

    pub const PASSWORD: &str = "correct";

    /// Build a session for `email` with a stable id derived from it.
    #[must_use]
    pub fn session_for(email: &str) -> Session {
        Session {
            access_token: format!("token-{email}"),
            refresh_token: format!("refresh-{email}"),
            token_type: "bearer".into(),
            expires_in: 3600,
            expires_at: None,
            user: User::new(format!("id-{email}"), Some(email.to_owned())),
        }
    }

    /// In-memory provider with switchable failures and an optional gate that
    /// holds every call until released.
    pub struct ScriptedProvider {
        session: Mutex<Option<Session>>,
        accounts: Mutex<HashMap<String, String>>,
        changes: CallbackRegistry<SessionChange>,
        calls: Mutex<Vec<&'static str>>,
        gated: AtomicBool,
        gate: Semaphore,
        pub fail_session_query: AtomicBool,
        pub fail_sign_out: AtomicBool,
        pub unreachable: AtomicBool,
        pub require_confirmation: AtomicBool,
    }

    impl ScriptedProvider {
        /// Provider knowing `a@b.com` with password [`PASSWORD`].
        #[must_use]
        pub fn new() -> Self {
            let mut accounts = HashMap::new();
            accounts.insert("a@b.com".to_owned(), PASSWORD.to_owned());
            Self {
                session: Mutex::new(None),
                accounts: Mutex::new(accounts),
                changes: CallbackRegistry::new(),
                calls: Mutex::new(Vec::new()),
                gated: AtomicBool::new(false),
                gate: Semaphore::new(0),
                fail_session_query: AtomicBool::new(false),
                fail_sign_out: AtomicBool::new(false),
                unreachable: AtomicBool::new(false),
                require_confirmation: AtomicBool::new(false),
            }
        }

        #[must_use]
        pub fn with_session(session: Session) -> Self {
            let provider = Self::new();
            *provider.session.lock().unwrap() = Some(session);
            provider
        }

        /// Replace the provider-side session without notifying anyone.
        pub fn set_session(&self, session: Option<Session>) {
            *self.session.lock().unwrap() = session;
        }

        #[must_use]
        pub fn current(&self) -> Option<Session> {
            self.session.lock().unwrap().clone()
        }

        /// Simulate an external push such as expiry or cross-tab sign-out.
        pub fn push(&self, change: SessionChange) {
            self.set_session(change.session.clone());
            self.changes.emit(&change);
        }

        #[must_use]
        pub fn subscriber_count(&self) -> usize {
            self.changes.len()
        }

        #[must_use]
        pub fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        /// Make every subsequent call wait for [`ScriptedProvider::release`].
        pub fn hold(&self) {
            self.gated.store(true, Ordering::SeqCst);
        }

        /// Let `n` held calls through.
        pub fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }

        async fn enter(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
            if self.gated.load(Ordering::SeqCst) {
                self.gate.acquire().await.unwrap().forget();
            }
        }

        fn offline(&self) -> bool {
            self.unreachable.load(Ordering::SeqCst)
        }
    }

    impl Default for ScriptedProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait::async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn get_current_session(&self) -> Result<Option<Session>, ProviderError> {
            self.enter("get_current_session").await;
            if self.fail_session_query.load(Ordering::SeqCst) || self.offline() {
                return Err(ProviderError::Request("connection refused".into()));
            }
            Ok(self.current())
        }

        async fn sign_in_with_password(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError> {
            self.enter("sign_in_with_password").await;
            if self.offline() {
                return Err(ProviderError::Request("connection refused".into()).into());
            }
            let known = self.accounts.lock().unwrap().get(identifier).cloned();
            if known.as_deref() != Some(secret) {
                return Err(AuthError::Rejected {
                    status: 400,
                    code: Some("invalid_credentials".into()),
                    message: "Invalid login credentials".into(),
                });
            }
            let session = session_for(identifier);
            self.push(SessionChange::new(SessionEvent::SignedIn, Some(session.clone())));
            Ok(AuthResponse::from_session(session))
        }

        async fn sign_up(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError> {
            self.enter("sign_up").await;
            if self.offline() {
                return Err(ProviderError::Request("connection refused".into()).into());
            }
            {
                let mut accounts = self.accounts.lock().unwrap();
                if accounts.contains_key(identifier) {
                    return Err(AuthError::Rejected {
                        status: 422,
                        code: Some("user_already_exists".into()),
                        message: "User already registered".into(),
                    });
                }
                accounts.insert(identifier.to_owned(), secret.to_owned());
            }
            let session = session_for(identifier);
            if self.require_confirmation.load(Ordering::SeqCst) {
                return Ok(AuthResponse::from_user(session.user));
            }
            self.push(SessionChange::new(SessionEvent::SignedIn, Some(session.clone())));
            Ok(AuthResponse::from_session(session))
        }

        async fn sign_out(&self) -> Result<(), ProviderError> {
            self.enter("sign_out").await;
            if self.fail_sign_out.load(Ordering::SeqCst) || self.offline() {
                return Err(ProviderError::Response { status: 500, body: "boom".into() });
            }
            self.push(SessionChange::signed_out());
            Ok(())
        }

        fn on_session_changed(&self, callback: SessionCallback) -> Subscription {
            self.changes.register(callback)
        }
    }
}
