//! Client-side session state and route guarding for a single-page app.
//!
//! ARCHITECTURE
//! ============
//! `Router` → `NavigationGuard` → `IdentityProvider`, with `SessionStore`
//! as the one place that performs login, registration and logout and that
//! views observe. The production provider is the Supabase Auth REST client
//! in [`provider::gotrue`].

pub mod config;
pub mod error;
pub mod guard;
pub mod observe;
pub mod provider;
pub mod routes;
pub mod session;

pub use config::ProviderConfig;
pub use error::{AuthError, ConfigError, ErrorCode, ProviderError};
pub use guard::{AccessPolicy, GuardOutcome, NavigationGuard};
pub use observe::Subscription;
pub use provider::gotrue::GoTrueClient;
pub use provider::{AuthResponse, IdentityProvider, Session, SessionChange, SessionEvent, User};
pub use routes::{Navigation, NavigationError, RouteDescriptor, RouteTable, Router};
pub use session::{SessionSnapshot, SessionStore, StoreOptions};
