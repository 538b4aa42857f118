//! Navigation guard: per-navigation access decision.
//!
//! SYSTEM CONTEXT
//! ==============
//! Runs before the destination view is built. It asks the provider for the
//! session every time instead of reading the store, so a navigation that
//! races initial hydration still sees the real answer.
//!
//! A provider failure during the check counts as "no session": protected
//! routes redirect to login, anonymous-only routes stay reachable.

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::provider::IdentityProvider;
use crate::session::SessionStore;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/dashboard";

/// Who may enter a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPolicy {
    Open,
    RequiresAuth,
    RequiresAnonymous,
}

/// Terminal state of one guard evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardOutcome {
    Allowed,
    RedirectedToLogin,
    RedirectedToHome,
}

impl GuardOutcome {
    /// Where the navigation must go instead, if anywhere.
    #[must_use]
    pub fn redirect_path(self) -> Option<&'static str> {
        match self {
            Self::Allowed => None,
            Self::RedirectedToLogin => Some(LOGIN_PATH),
            Self::RedirectedToHome => Some(HOME_PATH),
        }
    }
}

/// The access table: one outcome per `(policy, session_exists)` pair.
#[must_use]
pub fn decide(policy: AccessPolicy, session_exists: bool) -> GuardOutcome {
    match (policy, session_exists) {
        (AccessPolicy::Open, _) | (AccessPolicy::RequiresAuth, true) | (AccessPolicy::RequiresAnonymous, false) => {
            GuardOutcome::Allowed
        }
        (AccessPolicy::RequiresAuth, false) => GuardOutcome::RedirectedToLogin,
        (AccessPolicy::RequiresAnonymous, true) => GuardOutcome::RedirectedToHome,
    }
}

#[derive(Clone)]
pub struct NavigationGuard {
    provider: Arc<dyn IdentityProvider>,
}

impl NavigationGuard {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Guard backed by the same provider as `store`.
    #[must_use]
    pub fn for_store(store: &SessionStore) -> Self {
        Self::new(store.provider())
    }

    /// Decide whether a navigation from `from` to `to` may proceed.
    /// Never fails.
    pub async fn evaluate(&self, policy: AccessPolicy, to: &str, from: Option<&str>) -> GuardOutcome {
        if policy == AccessPolicy::Open {
            return GuardOutcome::Allowed;
        }

        let session_exists = match self.provider.get_current_session().await {
            Ok(session) => session.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, to, "session check failed during navigation; treating as signed out");
                false
            }
        };

        let outcome = decide(policy, session_exists);
        tracing::debug!(to, from = from.unwrap_or("-"), ?policy, session_exists, ?outcome, "guard evaluated");
        outcome
    }
}

impl std::fmt::Debug for NavigationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationGuard").finish_non_exhaustive()
    }
}
