//! URL construction for resource calls and the token endpoint

use tremendous_auth::{API_VERSION_PATH, TOKEN_PATH};

/// Join a base endpoint and a resource path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{base}/{path}")
}

/// Token endpoint for a base endpoint: the versioned API segment is dropped
/// and `/oauth/token` is appended to what remains.
pub fn token_endpoint(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let root = base.strip_suffix(API_VERSION_PATH).unwrap_or(base);
    join_url(root, TOKEN_PATH)
}
