//! Error types for credential, token exchange and webhook operations

/// Errors from authentication operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("no API key or OAuth access token configured")]
    NoCredential,

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("failed to encode token request: {0}")]
    Encoding(String),

    #[error("token endpoint returned {status}: {body}")]
    Exchange { status: u16, body: String },

    #[error("invalid token response: {0}")]
    Decoding(String),

    #[error("invalid webhook signature algorithm")]
    InvalidAlgorithm,

    #[error("operation cancelled")]
    Cancelled,
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
