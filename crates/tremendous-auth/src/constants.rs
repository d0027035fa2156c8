//! Tremendous API constants
//!
//! Base endpoints for the two environments and the fixed paths used by the
//! token exchange and webhook verification. None of these are secrets.

/// Production API base endpoint
pub const LIVE_ENDPOINT: &str = "https://api.tremendous.com/api/v2";

/// Sandbox ("testflight") API base endpoint
pub const TESTING_ENDPOINT: &str = "https://testflight.tremendous.com/api/v2";

/// Versioned API path segment carried by both base endpoints. The token
/// endpoint lives outside it.
pub const API_VERSION_PATH: &str = "/api/v2";

/// Token endpoint path, relative to the host root
pub const TOKEN_PATH: &str = "/oauth/token";

/// Header carrying the webhook signature, formatted `sha256=<hexdigest>`
pub const SIGNATURE_HEADER: &str = "Tremendous-Webhook-Signature";

/// The only accepted webhook signature algorithm
pub const SIGNATURE_ALGORITHM: &str = "sha256";
