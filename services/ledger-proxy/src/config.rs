//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credentials come only from FORMANCE_CLIENT_ID / FORMANCE_CLIENT_SECRET
//! env vars, never from the TOML file, to avoid leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    /// Startup credentials resolved from the environment, not the file
    #[serde(skip)]
    pub credentials: Option<StartupCredentials>,
}

/// HTTP server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Remote ledger endpoints
#[derive(Debug, Deserialize)]
pub struct LedgerConfig {
    /// Base URL the `/api/ledger/...` routes are forwarded under
    pub api_base: String,
    /// OAuth2 token endpoint for the client-credentials grant
    pub token_url: String,
}

/// Client ID/secret pair seeded into the vault at boot.
#[derive(Debug)]
pub struct StartupCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8787".parse().expect("valid default listen addr")
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Overlay order:
    /// 1. PORT replaces the listen port
    /// 2. FORMANCE_CLIENT_ID + FORMANCE_CLIENT_SECRET (both non-blank)
    ///    become the startup credentials
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        for (name, url) in [
            ("ledger.api_base", &config.ledger.api_base),
            ("ledger.token_url", &config.ledger.token_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if config.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| common::Error::Config(format!("PORT is not a valid port: {port}")))?;
            config.server.listen_addr.set_port(port);
        }

        config.credentials = match (
            std::env::var("FORMANCE_CLIENT_ID"),
            std::env::var("FORMANCE_CLIENT_SECRET"),
        ) {
            (Ok(id), Ok(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some(StartupCredentials {
                    client_id: id,
                    client_secret: Secret::new(secret),
                })
            }
            _ => None,
        };

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
        PathBuf::from("ledger-proxy.toml")
    }
}
