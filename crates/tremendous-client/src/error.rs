//! Error types for dispatching API requests

/// Errors from `Client` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no API key or OAuth access token configured")]
    NoCredential,

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("failed to encode request body: {0}")]
    Encoding(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] tremendous_auth::Error),

    #[error("token exchange failed: {0}")]
    Exchange(#[source] tremendous_auth::Error),

    #[error("tremendous: unexpected status code {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decoding(String),

    #[error("request cancelled")]
    Cancelled,
}

impl Error {
    /// HTTP status carried by an `Api` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<tremendous_auth::Error> for Error {
    /// Maps errors raised outside the automatic refresh path, which wraps its
    /// failures in `RefreshFailed` explicitly.
    fn from(err: tremendous_auth::Error) -> Self {
        use tremendous_auth::Error as Auth;
        match err {
            Auth::NoCredential => Error::NoCredential,
            Auth::InvalidCredentials(msg) => Error::InvalidCredentials(msg),
            Auth::Cancelled => Error::Cancelled,
            other => Error::Exchange(other),
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
