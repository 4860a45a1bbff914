//! Startup resolution of secret references.
//!
//! Any configuration value of the form `ssm://<name>` is an indirect
//! reference: `<name>` is looked up in the external secret store and the
//! result replaces the value. Resolution runs once, before the configuration
//! is built, and the resolved values are passed on explicitly.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

// ---

/// Marker prefix of a secret reference.
pub const SECRET_REF_PREFIX: &str = "ssm://";

/// A source of named secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// Secret store reached over HTTP: `GET <base_url>/<name>` returning
/// `{"value": "..."}`.
#[derive(Debug, Clone)]
pub struct HttpSecretStore {
    // ---
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SecretValue {
    value: String,
}

impl HttpSecretStore {
    // ---
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    /// Build a store from `SECRET_STORE_URL` and `SECRET_STORE_TOKEN`, if set.
    pub fn from_vars(vars: &HashMap<String, String>) -> Option<Self> {
        // ---
        let base_url = vars.get("SECRET_STORE_URL")?;
        let token = vars.get("SECRET_STORE_TOKEN").cloned();
        Some(Self::new(base_url.clone(), token))
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            name.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String> {
        // ---
        let url = self.secret_url(name);
        tracing::debug!("Fetching secret '{}' from {}", name, url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let secret: SecretValue = request
            .send()
            .await
            .with_context(|| format!("Secret store request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Secret store rejected lookup of '{}'", name))?
            .json()
            .await
            .with_context(|| format!("Secret store returned malformed value for '{}'", name))?;

        Ok(secret.value)
    }
}

/// Replace every `ssm://` value with the secret it names.
///
/// Values without the prefix pass through untouched. Any failed lookup
/// aborts resolution; nothing is retried.
pub async fn resolve_references<I>(
    vars: I,
    store: Option<&dyn SecretStore>,
) -> Result<HashMap<String, String>>
where
    I: IntoIterator<Item = (String, String)>,
{
    // ---
    let mut resolved = HashMap::new();

    for (key, value) in vars {
        let value = match value.strip_prefix(SECRET_REF_PREFIX) {
            Some(name) => {
                let store = store.ok_or_else(|| {
                    anyhow!(
                        "{} references secret '{}' but SECRET_STORE_URL is not set",
                        key,
                        name
                    )
                })?;
                tracing::info!("Resolving {} from secret store", key);
                store
                    .get_secret(name)
                    .await
                    .with_context(|| format!("Failed to resolve secret for {}", key))?
            }
            None => value,
        };
        resolved.insert(key, value);
    }

    Ok(resolved)
}
