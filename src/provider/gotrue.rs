//! Supabase Auth (GoTrue) REST client.
//!
//! ARCHITECTURE
//! ============
//! Thin HTTP wrapper for `{url}/auth/v1`. The client owns the current
//! session in memory, refreshes it when it is about to expire, and pushes
//! every transition to `on_session_changed` subscribers. Body parsing lives
//! in free functions so it can be tested without a server.
//!
//! ERROR HANDLING
//! ==============
//! 4xx answers to credential calls become `AuthError::Rejected` with the
//! provider's own message; everything else is a `ProviderError`. A client
//! built without configuration still works as a value: every call fails with
//! `ProviderError::NotConfigured`.

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod tests;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use super::types::{AuthResponse, Session, SessionChange, SessionEvent, User};
use super::{IdentityProvider, SessionCallback};
use crate::config::ProviderConfig;
use crate::error::{AuthError, ProviderError};
use crate::observe::{CallbackRegistry, Subscription};

/// Refresh this many seconds before the token actually expires.
const REFRESH_MARGIN_SECS: i64 = 10;

// =============================================================================
// CLIENT
// =============================================================================

struct Endpoint {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
}

pub struct GoTrueClient {
    endpoint: Option<Endpoint>,
    session: Mutex<Option<Session>>,
    /// Held across a refresh so concurrent callers share one token exchange.
    refreshing: tokio::sync::Mutex<()>,
    changes: CallbackRegistry<SessionChange>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl GoTrueClient {
    /// Build a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            endpoint: Some(Endpoint { http, auth_url: config.auth_url(), anon_key: config.anon_key.clone() }),
            session: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
            changes: CallbackRegistry::new(),
        })
    }

    /// A client whose every call fails with `NotConfigured`.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            endpoint: None,
            session: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
            changes: CallbackRegistry::new(),
        }
    }

    /// Same as [`GoTrueClient::new`], but logs a build failure and falls back
    /// to an unconfigured client.
    #[must_use]
    pub fn from_config_or_unconfigured(config: &ProviderConfig) -> Self {
        match Self::new(config) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "identity provider client build failed");
                Self::unconfigured()
            }
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Seed a previously persisted session. Emits `InitialSession`.
    pub fn restore_session(&self, session: Session) {
        let session = session.with_expiry_from(now_unix());
        self.replace_session(Some(session.clone()));
        self.changes.emit(&SessionChange::new(SessionEvent::InitialSession, Some(session)));
    }

    fn endpoint(&self) -> Result<&Endpoint, ProviderError> {
        self.endpoint.as_ref().ok_or(ProviderError::NotConfigured)
    }

    fn stored_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn settle(&self, event: SessionEvent, session: Option<Session>) {
        self.replace_session(session.clone());
        tracing::debug!(?event, "session change");
        self.changes.emit(&SessionChange::new(event, session));
    }

    /// POST a JSON body and return `(status, body)` without interpreting it.
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<(u16, String), ProviderError> {
        let endpoint = self.endpoint()?;
        let token = bearer.unwrap_or(&endpoint.anon_key);
        let response = endpoint
            .http
            .post(format!("{}{path}", endpoint.auth_url))
            .header("apikey", &endpoint.anon_key)
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok((status, text))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let (status, body) = self
            .post("/token?grant_type=refresh_token", &RefreshRequest { refresh_token }, None)
            .await?;
        if !(200..300).contains(&status) {
            return Err(parse_error(status, &body));
        }
        Ok(parse_session(&body)?.with_expiry_from(now_unix()))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoTrueClient {
    async fn get_current_session(&self) -> Result<Option<Session>, ProviderError> {
        self.endpoint()?;
        let Some(session) = self.stored_session() else {
            return Ok(None);
        };
        if !session.is_expired_at(now_unix(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }

        let _refreshing = self.refreshing.lock().await;
        // Another caller may have refreshed or signed out while we waited.
        let Some(session) = self.stored_session() else {
            return Ok(None);
        };
        if !session.is_expired_at(now_unix(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }
        if session.refresh_token.is_empty() {
            tracing::warn!("session expired without refresh token; signing out locally");
            self.settle(SessionEvent::SignedOut, None);
            return Ok(None);
        }

        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => {
                tracing::info!(user = %fresh.user.display_name(), "session refreshed");
                self.settle(SessionEvent::TokenRefreshed, Some(fresh.clone()));
                Ok(Some(fresh))
            }
            Err(AuthError::Rejected { status, message, .. }) => {
                tracing::warn!(%status, %message, "refresh rejected; signing out locally");
                self.settle(SessionEvent::SignedOut, None);
                Ok(None)
            }
            Err(AuthError::Provider(e)) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError> {
        let (status, body) = self
            .post("/token?grant_type=password", &Credentials { email: identifier, password: secret }, None)
            .await?;
        if !(200..300).contains(&status) {
            return Err(parse_error(status, &body));
        }

        let session = parse_session(&body)?.with_expiry_from(now_unix());
        tracing::info!(user = %session.user.display_name(), "signed in");
        self.settle(SessionEvent::SignedIn, Some(session.clone()));
        Ok(AuthResponse::from_session(session))
    }

    async fn sign_up(&self, identifier: &str, secret: &str) -> Result<AuthResponse, AuthError> {
        let (status, body) = self
            .post("/signup", &Credentials { email: identifier, password: secret }, None)
            .await?;
        if !(200..300).contains(&status) {
            return Err(parse_error(status, &body));
        }

        let response = parse_signup(&body, now_unix())?;
        match &response.session {
            Some(session) => {
                tracing::info!(user = %session.user.display_name(), "signed up with session");
                self.settle(SessionEvent::SignedIn, Some(session.clone()));
            }
            None => tracing::info!(identifier, "signed up; confirmation pending"),
        }
        Ok(response)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        self.endpoint()?;
        if let Some(session) = self.stored_session() {
            let (status, body) = self
                .post("/logout?scope=global", &serde_json::json!({}), Some(&session.access_token))
                .await?;
            // 401/403/404 mean the server already forgot the session.
            if !(200..300).contains(&status) && !matches!(status, 401 | 403 | 404) {
                return Err(ProviderError::Response { status, body });
            }
        }
        tracing::info!("signed out");
        self.settle(SessionEvent::SignedOut, None);
        Ok(())
    }

    fn on_session_changed(&self, callback: SessionCallback) -> Subscription {
        self.changes.register(callback)
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

fn parse_session(body: &str) -> Result<Session, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Sign-up answers with a full session, `{user, session}`, or a bare user
/// when email confirmation is pending.
fn parse_signup(body: &str, now_unix: i64) -> Result<AuthResponse, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    if value.get("access_token").is_some() {
        let session: Session = serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        return Ok(AuthResponse::from_session(session.with_expiry_from(now_unix)));
    }
    if value.get("user").is_some_and(serde_json::Value::is_object) {
        let mut response: AuthResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        response.session = response.session.map(|s| s.with_expiry_from(now_unix));
        return Ok(response);
    }
    let user: User = serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(AuthResponse::from_user(user))
}

/// Map a non-success answer to a rejection (4xx) or provider failure.
fn parse_error(status: u16, body: &str) -> AuthError {
    if !(400..500).contains(&status) {
        return AuthError::Provider(ProviderError::Response { status, body: body.to_owned() });
    }

    let value: serde_json::Value = serde_json::from_str(body).unwrap_or(serde_json::Value::Null);
    let text = |key: &str| value.get(key).and_then(serde_json::Value::as_str).map(str::to_owned);

    let message = text("error_description")
        .or_else(|| text("msg"))
        .or_else(|| text("message"))
        .or_else(|| text("error"))
        .unwrap_or_else(|| if body.is_empty() { format!("status {status}") } else { body.to_owned() });
    let code = text("error_code").or_else(|| text("error")).or_else(|| text("code"));

    AuthError::Rejected { status, code, message }
}
