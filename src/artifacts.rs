//! Storage of rendered charts and time-limited links to them.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::ChartArtifact;

type HmacSha256 = Hmac<Sha256>;

// ---

/// Persists chart artifacts and hands out retrievable links.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Store the artifact and return a time-limited link to it.
    async fn publish(&self, artifact: &ChartArtifact) -> Result<String>;
}

/// Signs and verifies `(key, expiry)` pairs for artifact links.
#[derive(Clone)]
pub struct LinkSigner {
    // ---
    secret: Vec<u8>,
    ttl_secs: u64,
}

impl LinkSigner {
    // ---
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs,
        }
    }

    /// Unix time at which a link issued at `now` stops working.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp()
            .saturating_add(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX))
    }

    pub fn sign(&self, key: &str, expires: i64) -> String {
        // ---
        let mac = self.mac(key, expires);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// True when `signature` matches and `now` is not past `expires`.
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        // ---
        if now.timestamp() > expires {
            return false;
        }
        let Ok(raw) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        self.mac(key, expires).verify_slice(&raw).is_ok()
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        // ---
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }
}

/// Artifact store on the local filesystem.
///
/// Links point at the service's own `/artifacts/{*key}` route, which checks
/// the signature before serving the file.
#[derive(Clone)]
pub struct FsArtifactStore {
    // ---
    root: PathBuf,
    public_base_url: String,
    signer: LinkSigner,
}

impl FsArtifactStore {
    // ---
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signer: LinkSigner,
    ) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
            signer,
        }
    }

    /// Build the signed link for `key`, valid until `expires`.
    pub fn link(&self, key: &str, expires: i64) -> String {
        // ---
        // Keys hold percent-encoded file names; encode segments again so the
        // router's path decoding hands back the stored key.
        let path = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!(
            "{}/artifacts/{}?expires={}&signature={}",
            self.public_base_url.trim_end_matches('/'),
            path,
            expires,
            self.signer.sign(key, expires)
        )
    }

    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        self.signer.verify(key, expires, signature, Utc::now())
    }

    /// Read a stored artifact. `Ok(None)` when no such artifact exists.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // ---
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read artifact {}", path.display())),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // ---
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(anyhow!("Invalid artifact key '{}'", key));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactPublisher for FsArtifactStore {
    async fn publish(&self, artifact: &ChartArtifact) -> Result<String> {
        // ---
        let path = self.path_for(&artifact.key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .with_context(|| format!("Failed to write artifact {}", path.display()))?;

        tracing::info!(
            "Stored artifact {} ({} bytes)",
            artifact.key,
            artifact.bytes.len()
        );

        let expires = self.signer.expiry_from(Utc::now());
        Ok(self.link(&artifact.key, expires))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::DateRange;
    use chrono::{Duration, NaiveDate};

    fn signer() -> LinkSigner {
        LinkSigner::new("link-key", 3600)
    }

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("plantflow-artifacts-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_signature_roundtrip() {
        // ---
        let now = Utc::now();
        let expires = signer().expiry_from(now);
        let sig = signer().sign("a/b.png", expires);

        assert!(signer().verify("a/b.png", expires, &sig, now));
        assert!(!signer().verify("a/c.png", expires, &sig, now));
        assert!(!signer().verify("a/b.png", expires + 1, &sig, now));
        assert!(!LinkSigner::new("other", 3600).verify("a/b.png", expires, &sig, now));
        assert!(!signer().verify("a/b.png", expires, "not base64!", now));
    }

    #[test]
    fn test_signature_expires() {
        // ---
        let now = Utc::now();
        let expires = signer().expiry_from(now);
        let sig = signer().sign("a/b.png", expires);

        assert_eq!(expires, now.timestamp() + 3600);
        assert!(signer().verify("a/b.png", expires, &sig, now + Duration::seconds(3600)));
        assert!(!signer().verify("a/b.png", expires, &sig, now + Duration::seconds(3601)));
    }

    #[test]
    fn test_link_encodes_key() {
        // ---
        let store = FsArtifactStore::new("/tmp", "http://localhost:8080/", signer());
        let link = store.link("0b9c/fern%20one_2024-01-01_2024-01-31.png", 100);

        assert!(link.starts_with(
            "http://localhost:8080/artifacts/0b9c/fern%2520one_2024-01-01_2024-01-31.png?expires=100&signature="
        ));
    }

    #[test]
    fn test_rejects_escaping_keys() {
        // ---
        let store = FsArtifactStore::new("/tmp", "http://localhost", signer());

        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("/etc/passwd").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("abc/chart.png").is_ok());
    }

    #[tokio::test]
    async fn test_publish_then_read() {
        // ---
        let root = temp_root();
        let store = FsArtifactStore::new(root.clone(), "http://localhost:8080", signer());
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        let artifact = ChartArtifact::new(vec![7, 8, 9], "aloe", &range);

        let url = store.publish(&artifact).await.unwrap();
        assert!(url.contains(&artifact.key));

        let bytes = store.read(&artifact.key).await.unwrap();
        assert_eq!(bytes, Some(vec![7, 8, 9]));
        assert_eq!(store.read("missing/chart.png").await.unwrap(), None);

        let _ = std::fs::remove_dir_all(root);
    }
}
