//! OAuth token exchange
//!
//! Both grants (authorization code and refresh token) POST the same JSON
//! payload shape to the token endpoint, which sits at the host root rather
//! than under the versioned API path. The exchange authenticates with the
//! client id/secret in the body, never with a bearer header, and it never
//! retries: a failed exchange is reported to the caller as-is.

use std::fmt;
use std::future::Future;

use common::Secret;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// OAuth grant used for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

/// Outbound token endpoint payload.
///
/// `code` and `redirect_uri` are only sent for the authorization code grant.
/// `refresh_token` is always present on the wire, empty for the initial
/// exchange.
#[derive(Debug, Clone, Serialize)]
pub struct AccessTokenRequest {
    pub client_id: String,
    #[serde(serialize_with = "expose_secret")]
    pub client_secret: Secret<String>,
    pub grant_type: GrantType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(serialize_with = "expose_secret")]
    pub refresh_token: Secret<String>,
}

impl AccessTokenRequest {
    /// Initial exchange of an authorization code for a token pair.
    pub fn authorization_code(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        code: impl Into<String>,
        redirect_uri: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            grant_type: GrantType::AuthorizationCode,
            code: Some(code.into()),
            redirect_uri,
            refresh_token: Secret::from(""),
        }
    }

    /// Renewal of an access token with a (single-use) refresh token.
    pub fn refresh(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        refresh_token: Secret<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            grant_type: GrantType::RefreshToken,
            code: None,
            redirect_uri: None,
            refresh_token,
        }
    }
}

fn expose_secret<S: Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose())
}

/// Response from the token endpoint for both grants.
///
/// `expires_in` is a delta in seconds; `created_at` is a unix timestamp in
/// seconds. The whole value is forwarded unchanged to refresh subscribers so
/// they can persist the new refresh token.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    pub refresh_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub created_at: i64,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Run `future` unless `cancel` fires first.
pub async fn with_cancel<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        output = future => Ok(output),
    }
}

/// Exchange a grant for a new token pair at `token_endpoint`.
///
/// Only a 200 is accepted. Any other status becomes `Error::Exchange` with the
/// response body kept for diagnostics.
pub async fn exchange(
    http: &reqwest::Client,
    token_endpoint: &str,
    request: &AccessTokenRequest,
    cancel: &CancellationToken,
) -> Result<TokenResponse> {
    let payload = serde_json::to_vec(request).map_err(|e| Error::Encoding(e.to_string()))?;

    debug!(endpoint = token_endpoint, grant_type = ?request.grant_type, "sending token exchange");

    let send = http
        .post(token_endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(payload)
        .send();
    let response = with_cancel(cancel, send)
        .await?
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    let body = with_cancel(cancel, response.bytes())
        .await?
        .map_err(|e| Error::Http(format!("reading token response: {e}")))?;

    if status != StatusCode::OK {
        return Err(Error::Exchange {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    serde_json::from_slice::<TokenResponse>(&body).map_err(|e| Error::Decoding(e.to_string()))
}
