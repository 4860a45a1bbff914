//! Configuration loader for the `plantflow` service.
//!
//! Values come from environment variables (with optional `.env` support
//! provided by the caller). Secret references are resolved first, so the
//! resulting [`Config`] only ever holds plain values.
//!
use std::{collections::HashMap, env, net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Result};

use crate::secrets::{self, HttpSecretStore, SecretStore};

/// Parse an optional integer variable with a default value.
macro_rules! parse_var_u64 {
    ($vars:expr, $var_name:expr, $default:expr) => {
        $vars
            .get($var_name)
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read a required string variable.
macro_rules! require_var {
    ($vars:expr, $var_name:expr) => {
        $vars
            .get($var_name)
            .cloned()
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Shared secret expected in the `auth` request header.
    pub auth_secret: String,

    /// Key used to sign artifact links.
    pub link_signing_key: String,

    /// Lifetime of an artifact link in seconds.
    pub link_ttl_secs: u64,

    /// Root directory of the artifact store.
    pub artifact_dir: PathBuf,

    /// Base URL that artifact links are built on.
    pub public_base_url: String,

    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
}

/// Load configuration from the process environment.
///
/// Resolves `ssm://` references through the secret store named by
/// `SECRET_STORE_URL` before building the [`Config`].
pub async fn load_from_env() -> Result<Config> {
    // ---
    let vars: HashMap<String, String> = env::vars().collect();
    let store = HttpSecretStore::from_vars(&vars);

    let resolved =
        secrets::resolve_references(vars, store.as_ref().map(|s| s as &dyn SecretStore)).await?;

    Config::from_vars(&resolved)
}

impl Config {
    // ---
    /// Build a configuration from already-resolved variables.
    ///
    /// Required:
    /// - `AUTH` – shared secret for the `auth` header
    /// - `LINK_SIGNING_KEY` – HMAC key for artifact links
    ///
    /// Optional:
    /// - `LINK_TTL_SECS` – link lifetime (default: 3600)
    /// - `ARTIFACT_DIR` – artifact store root (default: `./artifacts`)
    /// - `PUBLIC_BASE_URL` – link base (default: `http://localhost:8080`)
    /// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8080`)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Config> {
        // ---
        let auth_secret = require_var!(vars, "AUTH");
        let link_signing_key = require_var!(vars, "LINK_SIGNING_KEY");
        let link_ttl_secs = parse_var_u64!(vars, "LINK_TTL_SECS", 3600);

        let artifact_dir = vars
            .get("ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./artifacts"));
        let public_base_url = vars
            .get("PUBLIC_BASE_URL")
            .cloned()
            .unwrap_or_else(|| "http://localhost:8080".to_string());
        let listen_addr = vars
            .get("LISTEN_ADDR")
            .map(String::as_str)
            .unwrap_or("0.0.0.0:8080")
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("Invalid LISTEN_ADDR: {}", e))?;

        if auth_secret.is_empty() {
            return Err(anyhow!("AUTH must not be empty"));
        }

        Ok(Config {
            auth_secret,
            link_signing_key,
            link_ttl_secs,
            artifact_dir,
            public_base_url,
            listen_addr,
        })
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Secrets are masked; everything else is shown as loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  AUTH             : {}", mask(&self.auth_secret));
        tracing::info!("  LINK_SIGNING_KEY : {}", mask(&self.link_signing_key));
        tracing::info!("  LINK_TTL_SECS    : {}", self.link_ttl_secs);
        tracing::info!("  ARTIFACT_DIR     : {}", self.artifact_dir.display());
        tracing::info!("  PUBLIC_BASE_URL  : {}", self.public_base_url);
        tracing::info!("  LISTEN_ADDR      : {}", self.listen_addr);
    }
}

fn mask(secret: &str) -> String {
    format!("**** ({} chars)", secret.chars().count())
}
