//! Error taxonomy for configuration, provider transport, and credential
//! rejection.
//!
//! DESIGN
//! ======
//! Three enums, one per failure class. `ConfigError` only happens at
//! startup. `ProviderError` covers transport and service failures on any
//! call. `AuthError` is what the credential operations (sign-in, sign-up)
//! return, so callers can tell a rejected password apart from a dead network
//! without string matching.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

use std::time::Duration;

/// Stable machine-readable code attached to every error in this crate.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Provider configuration could not be assembled at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("missing config: env var {var} not set")]
    Missing { var: &'static str },

    /// An environment variable is set but cannot be used.
    #[error("invalid config {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

/// Network or service failure talking to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The client was built without a provider URL or key.
    #[error("identity provider not configured")]
    NotConfigured,

    /// The HTTP request did not complete.
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("provider response error: status {status}")]
    Response { status: u16, body: String },

    /// The provider answered with a body we could not decode.
    #[error("provider response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The call did not settle within the configured operation timeout.
    #[error("provider call timed out after {after:?}")]
    Timeout { after: Duration },
}

impl ErrorCode for ProviderError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "E_NOT_CONFIGURED",
            Self::Request(_) => "E_PROVIDER_REQUEST",
            Self::Response { .. } => "E_PROVIDER_RESPONSE",
            Self::Parse(_) => "E_PROVIDER_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Timeout { .. } => "E_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Timeout { .. } | Self::Response { status: 429 | 500..=599, .. }
        )
    }
}

// =============================================================================
// AUTH
// =============================================================================

/// Failure of a credential operation (sign-in or sign-up).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The provider refused the credentials: wrong password, duplicate
    /// registration, unconfirmed email and so on.
    #[error("credentials rejected ({status}): {message}")]
    Rejected { status: u16, code: Option<String>, message: String },

    /// The provider could not be reached or misbehaved.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AuthError {
    /// True when the provider answered and said no.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "E_AUTH_REJECTED",
            Self::Provider(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => *status == 429,
            Self::Provider(e) => e.retryable(),
        }
    }
}
