//! Static route table and the router that runs the guard.
//!
//! DESIGN
//! ======
//! Routes are plain data built once at startup. `Router::navigate` resolves
//! a path, follows static redirects, asks the guard, and follows the guard's
//! redirect until some route is allowed. The redirect target is evaluated
//! like any other navigation; the originally requested path is not kept
//! for a later "return to".

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::error::ErrorCode;
use crate::guard::{AccessPolicy, GuardOutcome, HOME_PATH, NavigationGuard};
use crate::session::SessionStore;

/// Upper bound on redirects followed by a single navigation.
pub const MAX_REDIRECTS: usize = 8;

// =============================================================================
// DESCRIPTORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteKind {
    /// Renders the named view under `policy`.
    View { name: String, policy: AccessPolicy },
    /// Always forwards to `to`.
    Redirect { to: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    pub path: String,
    #[serde(flatten)]
    pub kind: RouteKind,
}

impl RouteDescriptor {
    #[must_use]
    pub fn view(path: impl Into<String>, name: impl Into<String>, policy: AccessPolicy) -> Self {
        Self { path: path.into(), kind: RouteKind::View { name: name.into(), policy } }
    }

    #[must_use]
    pub fn redirect(path: impl Into<String>, to: impl Into<String>) -> Self {
        Self { path: path.into(), kind: RouteKind::Redirect { to: to.into() } }
    }

    /// Redirect entries are reachable by anyone.
    #[must_use]
    pub fn policy(&self) -> AccessPolicy {
        match &self.kind {
            RouteKind::View { policy, .. } => *policy,
            RouteKind::Redirect { .. } => AccessPolicy::Open,
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            RouteKind::View { name, .. } => Some(name),
            RouteKind::Redirect { .. } => None,
        }
    }
}

// =============================================================================
// TABLE
// =============================================================================

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
    not_found: RouteDescriptor,
}

impl RouteTable {
    /// Build a table. The first route with a matching path wins; anything
    /// unmatched resolves to `not_found`.
    #[must_use]
    pub fn new(routes: Vec<RouteDescriptor>, not_found: RouteDescriptor) -> Self {
        Self { routes, not_found }
    }

    /// The application's routes: auth pages, the protected views, and a
    /// catch-all not-found page.
    #[must_use]
    pub fn application() -> Self {
        use AccessPolicy::{RequiresAnonymous, RequiresAuth};

        Self::new(
            vec![
                RouteDescriptor::redirect("/", HOME_PATH),
                RouteDescriptor::view("/login", "login", RequiresAnonymous),
                RouteDescriptor::view("/register", "register", RequiresAnonymous),
                RouteDescriptor::view(HOME_PATH, "dashboard", RequiresAuth),
                RouteDescriptor::view("/serial-numbers", "serialNumbers", RequiresAuth),
                RouteDescriptor::view("/serial-numbers/upload", "serialNumbersUpload", RequiresAuth),
                RouteDescriptor::view("/email-templates", "emailTemplates", RequiresAuth),
                RouteDescriptor::view("/settings", "settings", RequiresAuth),
                RouteDescriptor::view("/logs", "logs", RequiresAuth),
            ],
            RouteDescriptor::view("/*", "notFound", AccessPolicy::Open),
        )
    }

    /// Descriptor for `path`, ignoring query, fragment and trailing slash.
    #[must_use]
    pub fn resolve(&self, path: &str) -> &RouteDescriptor {
        let path = normalize_path(path);
        self.routes
            .iter()
            .find(|r| r.path == path)
            .unwrap_or(&self.not_found)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.routes.iter().chain(std::iter::once(&self.not_found))
    }
}

/// Strip query and fragment, force a leading slash, drop a trailing one.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default().trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_owned();
    }
    if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") }
}

// =============================================================================
// NAVIGATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopReason {
    /// A redirect entry in the table.
    Static,
    /// The guard refused the route.
    Guard(GuardOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub from: String,
    pub to: String,
    pub reason: HopReason,
}

/// Result of a settled navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub requested: String,
    pub settled: String,
    /// View name of the settled route.
    pub route: String,
    pub hops: Vec<Hop>,
}

impl Navigation {
    #[must_use]
    pub fn was_redirected(&self) -> bool {
        !self.hops.is_empty()
    }

    /// Last guard decision that redirected this navigation, if any.
    #[must_use]
    pub fn guard_outcome(&self) -> GuardOutcome {
        self.hops
            .iter()
            .rev()
            .find_map(|h| match h.reason {
                HopReason::Guard(outcome) => Some(outcome),
                HopReason::Static => None,
            })
            .unwrap_or(GuardOutcome::Allowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("redirect loop navigating to {requested}: {hops} hops without settling")]
    RedirectLoop { requested: String, hops: usize },
}

impl ErrorCode for NavigationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::RedirectLoop { .. } => "E_REDIRECT_LOOP",
        }
    }
}

pub struct Router {
    table: RouteTable,
    guard: NavigationGuard,
    current: Mutex<Option<String>>,
}

impl Router {
    #[must_use]
    pub fn new(table: RouteTable, guard: NavigationGuard) -> Self {
        Self { table, guard, current: Mutex::new(None) }
    }

    /// Application routes guarded by `store`'s provider.
    #[must_use]
    pub fn for_store(store: &SessionStore) -> Self {
        Self::new(RouteTable::application(), NavigationGuard::for_store(store))
    }

    /// Path of the last settled navigation.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Navigate to `path`, following static and guard redirects.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::RedirectLoop`] if the route table keeps
    /// redirecting for more than [`MAX_REDIRECTS`] hops.
    pub async fn navigate(&self, path: &str) -> Result<Navigation, NavigationError> {
        let requested = normalize_path(path);
        let from = self.current();
        let mut target = requested.clone();
        let mut hops = Vec::new();

        loop {
            if hops.len() > MAX_REDIRECTS {
                tracing::error!(%requested, hops = hops.len(), "redirect loop");
                return Err(NavigationError::RedirectLoop { requested, hops: hops.len() });
            }

            let route = self.table.resolve(&target);
            let (next, reason) = match &route.kind {
                RouteKind::Redirect { to } => (normalize_path(to), HopReason::Static),
                RouteKind::View { name, policy } => {
                    let outcome = self.guard.evaluate(*policy, &target, from.as_deref()).await;
                    match outcome.redirect_path() {
                        None => {
                            let navigation = Navigation {
                                requested,
                                settled: target.clone(),
                                route: name.clone(),
                                hops,
                            };
                            *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(target);
                            tracing::info!(
                                requested = %navigation.requested,
                                settled = %navigation.settled,
                                route = %navigation.route,
                                "navigation settled"
                            );
                            return Ok(navigation);
                        }
                        Some(redirect) => (redirect.to_owned(), HopReason::Guard(outcome)),
                    }
                }
            };

            hops.push(Hop { from: target.clone(), to: next.clone(), reason });
            target = next;
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table.routes.len())
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
