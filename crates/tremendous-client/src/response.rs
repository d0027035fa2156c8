//! Response classification
//!
//! Each response status is classified once, and the dispatcher branches on
//! the result. Only 200, 201 and 202 count as success; every other status
//! (204 included) is surfaced to the caller as an API error.

use reqwest::StatusCode;

/// What the dispatcher should do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// 200, 201, 202: hand the response back unread
    Success,
    /// 401: eligible for one refresh-and-retry
    NeedsRefresh,
    /// Other 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// Anything else (1xx, 204 and other 2xx, 3xx)
    Unexpected,
}

impl ResponseKind {
    pub fn classify(status: StatusCode) -> Self {
        match status.as_u16() {
            200 | 201 | 202 => ResponseKind::Success,
            401 => ResponseKind::NeedsRefresh,
            400..=499 => ResponseKind::ClientError,
            500..=599 => ResponseKind::ServerError,
            _ => ResponseKind::Unexpected,
        }
    }

    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseKind::Success => "success",
            ResponseKind::NeedsRefresh => "needs_refresh",
            ResponseKind::ClientError => "client_error",
            ResponseKind::ServerError => "server_error",
            ResponseKind::Unexpected => "unexpected",
        }
    }
}
