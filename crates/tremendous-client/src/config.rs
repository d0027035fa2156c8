//! Client configuration
//!
//! Fixed when the `Client` is built and never mutated afterwards. The mutable
//! part of a client (its credential) lives in the shared `CredentialStore`.

use std::time::Duration;

use serde::Deserialize;
use tremendous_auth::{LIVE_ENDPOINT, TESTING_ENDPOINT};

use crate::error::{Error, Result};

/// Default per-request timeout applied to the transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote environment a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Live,
    Testing,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Live => LIVE_ENDPOINT,
            Environment::Testing => TESTING_ENDPOINT,
        }
    }
}

/// Immutable client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Refresh the OAuth token once on a 401 and retry the request
    pub auto_refresh: bool,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            base_url: environment.base_url().to_string(),
            auto_refresh: false,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("tremendous-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Override the base endpoint (stub servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the reqwest transport for this configuration.
    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client: {e}")))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}
