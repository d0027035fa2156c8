//! Tremendous authentication library
//!
//! Credential storage, OAuth token exchange and webhook signature
//! verification for the Tremendous REST API. Has no dependency on
//! `tremendous-client`, so the webhook verifier can be used by a receiver
//! that never calls the API.
//!
//! Credential flow:
//! 1. Caller builds a `Credential` (API key or OAuth pair) into a `CredentialStore`
//! 2. Each request reads `CredentialStore::resolve_bearer()`
//! 3. On a 401, one refresher holds `CredentialStore::lock_refresh()` and calls
//!    `token::exchange()` with `CredentialStore::refresh_request()`
//! 4. The new pair lands in `CredentialStore::rotate()`
//!
//! Webhook deliveries are checked independently with `webhook::verify()`.

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;
pub mod webhook;

pub use constants::*;
pub use credentials::{Bearer, Credential, CredentialStore, OAuthCredential};
pub use error::{Error, Result};
pub use token::{AccessTokenRequest, GrantType, TokenResponse, exchange, with_cancel};
pub use webhook::{WebhookSignature, compute_signature, parse_signature, verify};
