//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The webhook secret is loaded from TREMENDOUS_WEBHOOK_SECRET or
//! secret_file, never stored in the TOML directly to avoid leaking it.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Environment variable holding the webhook shared secret
pub const SECRET_ENV: &str = "TREMENDOUS_WEBHOOK_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Upper bound on a buffered delivery body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Webhook endpoint settings
#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_path")]
    pub path: String,
    /// Path to a file containing the shared secret (alternative to the env var)
    #[serde(default)]
    pub secret_file: Option<PathBuf>,
    /// Resolved in `Config::load`; always set on a loaded config.
    #[serde(skip)]
    pub secret: Option<Secret<String>>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            secret_file: None,
            secret: None,
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_path() -> String {
    "/webhooks/tremendous".into()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Secret resolution order:
    /// 1. TREMENDOUS_WEBHOOK_SECRET env var
    /// 2. secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.server.max_body_bytes == 0 {
            return Err(common::Error::Config(
                "max_body_bytes must be greater than 0".into(),
            ));
        }
        if !config.webhook.path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "webhook path must start with '/', got: {}",
                config.webhook.path
            )));
        }

        // Both sources are trimmed; a blank env value counts as unset
        let from_env = std::env::var(SECRET_ENV)
            .map(|value| value.trim().to_owned())
            .ok()
            .filter(|value| !value.is_empty());
        let secret = match from_env {
            Some(value) => value,
            None => match config.webhook.secret_file {
                Some(ref file) => std::fs::read_to_string(file)
                    .map_err(|e| {
                        common::Error::Config(format!(
                            "failed to read secret_file {}: {e}",
                            file.display()
                        ))
                    })?
                    .trim()
                    .to_owned(),
                None => String::new(),
            },
        };
        if secret.is_empty() {
            return Err(common::Error::Config(format!(
                "webhook secret missing: set {SECRET_ENV} or webhook.secret_file"
            )));
        }
        config.webhook.secret = Some(Secret::new(secret));

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("webhook-receiver.toml")
    }
}
