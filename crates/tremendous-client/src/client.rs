//! Authenticated request dispatch
//!
//! `Client::send` is the one path every API call goes through:
//! 1. Encode the JSON body (if any)
//! 2. Resolve the bearer credential from the shared `CredentialStore`
//! 3. Send to `join_url(base_url, path)` with `Authorization: Bearer` and
//!    `Content-Type: application/json`
//! 4. On a 401 with auto-refresh enabled and a refresh token available,
//!    refresh once (single-flight), publish the new token, and resend the
//!    original request exactly once. Whatever the resend returns is final.
//! 5. 200/201/202 come back unread; anything else becomes `Error::Api` with
//!    the raw body.
//!
//! Transport failures and cancellation are never retried here.

use std::sync::Arc;

use bytes::Bytes;
use common::Secret;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use tremendous_auth::{
    AccessTokenRequest, Bearer, Credential, CredentialStore, OAuthCredential, TokenResponse,
    exchange, with_cancel,
};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::metrics::{record_refresh, record_request};
use crate::notifier::RefreshNotifier;
use crate::response::ResponseKind;
use crate::url::{join_url, token_endpoint};

struct Inner {
    config: ClientConfig,
    http: reqwest::Client,
    token_endpoint: String,
    credentials: CredentialStore,
    notifier: RefreshNotifier,
}

/// Handle to one logical API client.
///
/// Cloning is cheap and every clone shares the same configuration,
/// transport, credential and refresh stream, so a token rotated by one clone
/// is used by all of them.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Build a client with a transport derived from `config`.
    pub fn new(config: ClientConfig, credential: Credential) -> Result<Self> {
        let http = config.build_http_client()?;
        Ok(Self::with_http_client(config, http, credential))
    }

    /// Build a client over an existing transport.
    pub fn with_http_client(
        config: ClientConfig,
        http: reqwest::Client,
        credential: Credential,
    ) -> Self {
        Self::from_store(config, http, CredentialStore::new(credential))
    }

    /// Build a client around a store, which may be empty.
    pub fn from_store(config: ClientConfig, http: reqwest::Client, store: CredentialStore) -> Self {
        let token_endpoint = token_endpoint(&config.base_url);
        debug!(
            base_url = %config.base_url,
            token_endpoint,
            auto_refresh = config.auto_refresh,
            "client created"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                http,
                token_endpoint,
                credentials: store,
                notifier: RefreshNotifier::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The shared credential cell.
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Take the refresh event stream. Only the first caller gets it.
    pub fn refresh_events(&self) -> Option<mpsc::Receiver<TokenResponse>> {
        self.inner.notifier.subscribe()
    }

    /// Close the refresh event stream. Returns `true` for the call that
    /// closed it; later calls from any clone are no-ops.
    pub fn close(&self) -> bool {
        self.inner.notifier.close()
    }

    /// Send an authenticated request and return the raw success response.
    #[instrument(skip_all, fields(method = %method, path = path))]
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let payload = body.map(encode_body).transpose()?;
        let bearer = self.inner.credentials.resolve_bearer().await?;
        let url = join_url(&self.inner.config.base_url, path);

        let response = self
            .transmit(cancel, &method, &url, payload.clone(), &bearer)
            .await?;

        if ResponseKind::classify(response.status()) == ResponseKind::NeedsRefresh
            && self.inner.config.auto_refresh
            && self.inner.credentials.can_refresh().await
        {
            debug!(generation = bearer.generation, "unauthorized, refreshing token");
            drop(response);
            self.refresh(cancel, &bearer).await?;

            let bearer = self.inner.credentials.resolve_bearer().await?;
            let retried = self
                .transmit(cancel, &method, &url, payload, &bearer)
                .await?;
            return self.finish(cancel, retried).await;
        }

        self.finish(cancel, response).await
    }

    /// `send` without a request body.
    pub async fn send_empty(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
    ) -> Result<Response> {
        self.send::<()>(cancel, method, path, None).await
    }

    /// `send`, then decode the success body as JSON.
    pub async fn send_json<B, T>(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(cancel, method, path, body).await?;
        Self::decode(response).await
    }

    /// Read a response body and decode it as JSON.
    pub async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body: {e}")))?;
        serde_json::from_slice(&body).map_err(|e| Error::Decoding(e.to_string()))
    }

    /// Run a raw token exchange against this client's token endpoint.
    ///
    /// Does not touch the stored credential.
    pub async fn exchange(
        &self,
        cancel: &CancellationToken,
        request: &AccessTokenRequest,
    ) -> Result<TokenResponse> {
        Ok(exchange(&self.inner.http, &self.inner.token_endpoint, request, cancel).await?)
    }

    /// Exchange an authorization code and install the resulting OAuth
    /// credential, replacing whatever was configured before.
    ///
    /// The new token is published on the refresh stream like any refresh.
    pub async fn authorize(
        &self,
        cancel: &CancellationToken,
        client_id: &str,
        client_secret: Secret<String>,
        code: &str,
        redirect_uri: Option<String>,
    ) -> Result<TokenResponse> {
        let request = AccessTokenRequest::authorization_code(
            client_id,
            client_secret.clone(),
            code,
            redirect_uri,
        );

        let _guard = with_cancel(cancel, self.inner.credentials.lock_refresh()).await?;
        let token = self.exchange(cancel, &request).await?;

        self.inner
            .credentials
            .set(Credential::OAuth(OAuthCredential {
                client_id: client_id.to_string(),
                client_secret,
                access_token: Secret::from(token.access_token.as_str()),
                refresh_token: Secret::from(token.refresh_token.as_str()),
            }))
            .await;
        info!(client_id, "authorization code exchanged, OAuth credential installed");

        // Delivery failures are logged by the notifier; the credential stands.
        if let Err(e) = self.inner.notifier.publish(token.clone()).await {
            debug!(client_id, error = %e, "authorization token not delivered");
        }
        Ok(token)
    }

    /// Single-flight refresh.
    ///
    /// `observed` is the bearer the failed request was sent with. If the
    /// store moved past its generation while we waited for the guard,
    /// another caller already refreshed and the rotated credential is reused
    /// as-is: the old refresh token is spent and must not be exchanged twice.
    /// If instead an attempt failed while we waited, its error is ours too.
    /// A cancelled attempt records nothing, so the next waiter tries again.
    async fn refresh(&self, cancel: &CancellationToken, observed: &Bearer) -> Result<()> {
        let store = &self.inner.credentials;
        let _guard = with_cancel(cancel, store.lock_refresh()).await?;

        if store.generation().await != observed.generation {
            debug!(
                observed = observed.generation,
                "credential already rotated by a concurrent refresh"
            );
            record_refresh("coalesced");
            return Ok(());
        }
        if let Some(e) = store.refresh_failure_since(observed).await {
            debug!(error = %e, "sharing the failure of a concurrent refresh");
            record_refresh("coalesced_failure");
            return Err(Error::RefreshFailed(e));
        }

        let request = store
            .refresh_request()
            .await
            .ok_or(Error::RefreshFailed(tremendous_auth::Error::NoCredential))?;

        let token = match exchange(&self.inner.http, &self.inner.token_endpoint, &request, cancel)
            .await
        {
            Ok(token) => token,
            Err(tremendous_auth::Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                record_refresh("failure");
                store.record_refresh_failure(e.clone()).await;
                return Err(Error::RefreshFailed(e));
            }
        };

        let generation = store
            .rotate(&token.access_token, &token.refresh_token)
            .await
            .map_err(Error::RefreshFailed)?;
        record_refresh("success");
        info!(generation, expires_in = token.expires_in, "refreshed OAuth access token");

        // Delivery failures are logged by the notifier; the rotation stands.
        if let Err(e) = self.inner.notifier.publish(token).await {
            debug!(generation, error = %e, "refresh token not delivered");
        }
        Ok(())
    }

    async fn transmit(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &str,
        payload: Option<Bytes>,
        bearer: &Bearer,
    ) -> Result<Response> {
        let mut request = self
            .inner
            .http
            .request(method.clone(), url)
            .bearer_auth(bearer.token.expose())
            .header(CONTENT_TYPE, "application/json");
        if let Some(payload) = payload {
            request = request.body(payload);
        }

        let response = with_cancel(cancel, request.send())
            .await?
            .map_err(|e| Error::Transport(e.to_string()))?;
        record_request(response.status().as_u16());
        debug!(status = response.status().as_u16(), url, "response received");
        Ok(response)
    }

    async fn finish(&self, cancel: &CancellationToken, response: Response) -> Result<Response> {
        let status = response.status();
        match ResponseKind::classify(status) {
            ResponseKind::Success => Ok(response),
            kind => {
                let body = with_cancel(cancel, response.text())
                    .await?
                    .map_err(|e| Error::Transport(format!("reading error body: {e}")))?;
                debug!(status = status.as_u16(), kind = kind.label(), "request failed");
                Err(Error::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Bytes> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(|e| Error::Encoding(e.to_string()))
}
