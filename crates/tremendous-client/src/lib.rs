//! Authenticated client for the Tremendous REST API
//!
//! Every call goes through `Client::send`, which attaches the bearer
//! credential and, for OAuth credentials with auto-refresh enabled, recovers
//! from an expired access token transparently:
//! 1. Request comes back 401
//! 2. Exactly one refresh runs per credential generation; concurrent callers
//!    wait for it and reuse the rotated token
//! 3. The new token response is published on the refresh stream so callers
//!    can persist the rotated (single-use) refresh token
//! 4. The original request is sent once more; its outcome is final
//!
//! Clones of a `Client` share credential, transport and refresh stream.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod response;
pub mod url;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_TIMEOUT, Environment};
pub use error::{Error, Result};
pub use notifier::{NotifierError, REFRESH_CHANNEL_CAPACITY, RefreshNotifier};
pub use response::ResponseKind;
pub use tremendous_auth::{Credential, CredentialStore, TokenResponse};
pub use url::{join_url, token_endpoint};
