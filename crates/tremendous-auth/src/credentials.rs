//! In-memory credential cell for one logical client
//!
//! Holds exactly one active credential: a static API key or an OAuth token
//! pair. All clones of a client share one store, so a rotation made by one
//! request is seen by every other holder. Reads and the single write path go
//! through a tokio `RwLock`; the access/refresh pair is always replaced under
//! one write guard so no reader can observe half of a rotation.
//!
//! Every replacement bumps a generation counter. A request remembers the
//! generation its bearer came from, which lets a refresher waiting on
//! `lock_refresh` tell whether someone else already rotated the tokens.
//! Finished refresh attempts are counted the same way, and the last failure
//! is kept, so callers that queued behind a failed refresh share its error
//! instead of replaying a refresh token the provider just rejected.

use common::Secret;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::token::AccessTokenRequest;

/// OAuth client registration plus the current token pair.
#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub access_token: Secret<String>,
    /// Single-use at the provider; discarded as soon as a new one arrives.
    pub refresh_token: Secret<String>,
}

/// The credential presented as `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub enum Credential {
    ApiKey(Secret<String>),
    OAuth(OAuthCredential),
}

impl Credential {
    /// Static API key credential.
    pub fn api_key(key: impl Into<String>) -> Self {
        Credential::ApiKey(Secret::new(key.into()))
    }

    /// OAuth credential. `refresh_token` may be empty, which disables refresh.
    pub fn oauth(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Credential::OAuth(OAuthCredential {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
        })
    }

    /// Label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ApiKey(_) => "api_key",
            Credential::OAuth(_) => "oauth",
        }
    }

    fn bearer(&self) -> Option<&Secret<String>> {
        let token = match self {
            Credential::ApiKey(key) => key,
            Credential::OAuth(oauth) => &oauth.access_token,
        };
        (!token.is_empty()).then_some(token)
    }
}

/// A resolved bearer token and the store generation it was read at.
#[derive(Debug, Clone)]
pub struct Bearer {
    pub token: Secret<String>,
    pub generation: u64,
    /// Finished refresh attempts at resolution time
    pub refresh_attempts: u64,
}

#[derive(Debug, Default)]
struct State {
    credential: Option<Credential>,
    generation: u64,
    refresh_attempts: u64,
    last_refresh_error: Option<Error>,
}

/// Lock-guarded credential cell.
#[derive(Debug, Default)]
pub struct CredentialStore {
    state: RwLock<State>,
    refresh: Mutex<()>,
}

impl CredentialStore {
    /// Store holding `credential`.
    pub fn new(credential: Credential) -> Self {
        Self {
            state: RwLock::new(State {
                credential: Some(credential),
                ..State::default()
            }),
            refresh: Mutex::new(()),
        }
    }

    /// Store with nothing configured. `resolve_bearer` fails until `set`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the active credential wholesale.
    pub async fn set(&self, credential: Credential) {
        let mut state = self.state.write().await;
        debug!(kind = credential.kind(), "credential replaced");
        state.credential = Some(credential);
        state.generation += 1;
        state.last_refresh_error = None;
    }

    /// Clone of the active credential, if any.
    pub async fn current(&self) -> Option<Credential> {
        self.state.read().await.credential.clone()
    }

    /// The static API key if configured, else the OAuth access token.
    pub async fn resolve_bearer(&self) -> Result<Bearer> {
        let state = self.state.read().await;
        let token = state
            .credential
            .as_ref()
            .and_then(Credential::bearer)
            .ok_or(Error::NoCredential)?;
        Ok(Bearer {
            token: token.clone(),
            generation: state.generation,
            refresh_attempts: state.refresh_attempts,
        })
    }

    /// Atomically replace the OAuth access and refresh tokens.
    ///
    /// Returns the new generation.
    pub async fn rotate(&self, access_token: &str, refresh_token: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        match state.credential.as_mut() {
            Some(Credential::OAuth(oauth)) => {
                oauth.access_token = Secret::from(access_token);
                oauth.refresh_token = Secret::from(refresh_token);
            }
            Some(Credential::ApiKey(_)) => {
                return Err(Error::InvalidCredentials(
                    "a static API key cannot be rotated".into(),
                ));
            }
            None => return Err(Error::NoCredential),
        }
        state.generation += 1;
        state.refresh_attempts += 1;
        state.last_refresh_error = None;
        debug!(generation = state.generation, "rotated OAuth tokens");
        Ok(state.generation)
    }

    /// Refresh grant for the current OAuth state.
    ///
    /// `None` for API keys, an empty store, or an empty refresh token.
    pub async fn refresh_request(&self) -> Option<AccessTokenRequest> {
        let state = self.state.read().await;
        match state.credential.as_ref()? {
            Credential::OAuth(oauth) if !oauth.refresh_token.is_empty() => {
                Some(AccessTokenRequest::refresh(
                    oauth.client_id.clone(),
                    oauth.client_secret.clone(),
                    oauth.refresh_token.clone(),
                ))
            }
            _ => None,
        }
    }

    /// Whether a refresh grant could be built right now.
    pub async fn can_refresh(&self) -> bool {
        self.refresh_request().await.is_some()
    }

    /// Current generation.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Record a refresh attempt that ended without rotating the tokens.
    ///
    /// Call while holding `lock_refresh`.
    pub async fn record_refresh_failure(&self, error: Error) {
        let mut state = self.state.write().await;
        state.refresh_attempts += 1;
        debug!(attempts = state.refresh_attempts, error = %error, "refresh attempt failed");
        state.last_refresh_error = Some(error);
    }

    /// The failure a caller holding `bearer` should adopt instead of running
    /// its own exchange.
    ///
    /// `Some` when the credential is still the one `bearer` was read from and
    /// a refresh attempt finished, unsuccessfully, after that read.
    pub async fn refresh_failure_since(&self, bearer: &Bearer) -> Option<Error> {
        let state = self.state.read().await;
        if state.generation != bearer.generation
            || state.refresh_attempts == bearer.refresh_attempts
        {
            return None;
        }
        state.last_refresh_error.clone()
    }

    /// Acquire the single-flight refresh guard.
    ///
    /// Only the holder may run a refresh exchange. Others queue here and, once
    /// inside, compare `generation()` with the one their 401 was sent at and
    /// check `refresh_failure_since` before exchanging.
    pub async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::GrantType;
    use std::sync::Arc;

    fn oauth_store() -> CredentialStore {
        CredentialStore::new(Credential::oauth("client_1", "cs_1", "at_old", "rt_old"))
    }

    #[tokio::test]
    async fn resolves_api_key() {
        let store = CredentialStore::new(Credential::api_key("TEST_key"));
        let bearer = store.resolve_bearer().await.unwrap();
        assert_eq!(bearer.token.expose(), "TEST_key");
        assert_eq!(bearer.generation, 0);
    }

    #[tokio::test]
    async fn resolves_oauth_access_token() {
        let bearer = oauth_store().resolve_bearer().await.unwrap();
        assert_eq!(bearer.token.expose(), "at_old");
    }

    #[tokio::test]
    async fn empty_store_has_no_credential() {
        let err = CredentialStore::empty().resolve_bearer().await.unwrap_err();
        assert!(matches!(err, Error::NoCredential));
    }

    #[tokio::test]
    async fn empty_tokens_count_as_missing() {
        let key = CredentialStore::new(Credential::api_key(""));
        assert!(matches!(
            key.resolve_bearer().await.unwrap_err(),
            Error::NoCredential
        ));

        let oauth = CredentialStore::new(Credential::oauth("c", "s", "", "rt"));
        assert!(matches!(
            oauth.resolve_bearer().await.unwrap_err(),
            Error::NoCredential
        ));
    }

    #[tokio::test]
    async fn rotate_replaces_both_tokens_and_bumps_generation() {
        let store = oauth_store();
        let generation = store.rotate("at_new", "rt_new").await.unwrap();
        assert_eq!(generation, 1);

        let bearer = store.resolve_bearer().await.unwrap();
        assert_eq!(bearer.token.expose(), "at_new");
        assert_eq!(bearer.generation, 1);

        let request = store.refresh_request().await.unwrap();
        assert_eq!(request.refresh_token.expose(), "rt_new");
    }

    #[tokio::test]
    async fn rotate_api_key_is_rejected() {
        let store = CredentialStore::new(Credential::api_key("key"));
        let err = store.rotate("at", "rt").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
        assert_eq!(store.generation().await, 0);
    }

    #[tokio::test]
    async fn rotate_empty_store_is_no_credential() {
        let err = CredentialStore::empty().rotate("at", "rt").await.unwrap_err();
        assert!(matches!(err, Error::NoCredential));
    }

    #[tokio::test]
    async fn refresh_request_uses_client_registration() {
        let request = oauth_store().refresh_request().await.unwrap();
        assert_eq!(request.client_id, "client_1");
        assert_eq!(request.client_secret.expose(), "cs_1");
        assert_eq!(request.grant_type, GrantType::RefreshToken);
        assert!(request.code.is_none());
    }

    #[tokio::test]
    async fn refresh_not_possible_without_refresh_token() {
        let api_key = CredentialStore::new(Credential::api_key("key"));
        assert!(!api_key.can_refresh().await);

        let no_refresh = CredentialStore::new(Credential::oauth("c", "s", "at", ""));
        assert!(!no_refresh.can_refresh().await);

        assert!(oauth_store().can_refresh().await);
    }

    #[tokio::test]
    async fn failed_refresh_is_shared_with_callers_that_saw_the_same_credential() {
        let store = oauth_store();
        let before = store.resolve_bearer().await.unwrap();
        assert!(store.refresh_failure_since(&before).await.is_none());

        {
            let _guard = store.lock_refresh().await;
            store
                .record_refresh_failure(Error::Exchange {
                    status: 400,
                    body: "invalid_grant".into(),
                })
                .await;
        }

        let shared = store.refresh_failure_since(&before).await.unwrap();
        assert!(matches!(shared, Error::Exchange { status: 400, .. }));
        assert_eq!(store.generation().await, 0);

        // A caller that read the credential after the failure gets its own try
        let after = store.resolve_bearer().await.unwrap();
        assert!(store.refresh_failure_since(&after).await.is_none());

        // A successful rotation clears the recorded failure
        store.rotate("at_2", "rt_2").await.unwrap();
        let rotated = store.resolve_bearer().await.unwrap();
        assert!(store.refresh_failure_since(&before).await.is_none());
        assert!(store.refresh_failure_since(&rotated).await.is_none());
    }

    #[tokio::test]
    async fn set_replaces_credential_and_bumps_generation() {
        let store = CredentialStore::empty();
        store.set(Credential::api_key("key_1")).await;
        assert_eq!(store.generation().await, 1);
        assert_eq!(
            store.resolve_bearer().await.unwrap().token.expose(),
            "key_1"
        );
        assert_eq!(store.current().await.unwrap().kind(), "api_key");
    }

    #[tokio::test]
    async fn readers_never_see_half_rotated_pair() {
        let store = Arc::new(oauth_store());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    store
                        .rotate(&format!("at_{i}"), &format!("rt_{i}"))
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = vec![];
        for _ in 0..4 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    if let Some(Credential::OAuth(oauth)) = store.current().await {
                        let access = oauth.access_token.expose().trim_start_matches("at_");
                        let refresh = oauth.refresh_token.expose().trim_start_matches("rt_");
                        assert_eq!(access, refresh, "torn credential pair");
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(store.generation().await, 200);
    }
}
