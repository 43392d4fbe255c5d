//! Content-addressed file storage behind the IPFS pinning gateway.
//!
//! The gateway is an external collaborator: we forward bytes and keep only
//! the returned CID plus metadata. A mock store keeps tests and local dev
//! offline.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::info;

#[async_trait]
pub trait IpfsStore: Send + Sync + 'static {
    /// Pin the bytes, returning the content address.
    async fn add(&self, file_name: &str, bytes: Vec<u8>) -> anyhow::Result<String>;
    fn public_url(&self, cid: &str) -> String;
}

/// Talks to a Kubo-compatible pinning API (`POST /api/v0/add`).
pub struct HttpPinStore {
    api_url: String,
    gateway_url: String,
    http: reqwest::Client,
}

#[async_trait]
impl IpfsStore for HttpPinStore {
    async fn add(&self, file_name: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = self
            .http
            .post(format!("{}/api/v0/add", self.api_url.trim_end_matches('/')))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        let cid = body
            .get("Hash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("gateway response missing Hash"))?;
        Ok(cid.to_string())
    }

    fn public_url(&self, cid: &str) -> String {
        format!("{}/ipfs/{cid}", self.gateway_url.trim_end_matches('/'))
    }
}

/// Offline store: derives a deterministic fake CID from the content digest.
pub struct MockPinStore {
    gateway_url: String,
}

#[async_trait]
impl IpfsStore for MockPinStore {
    async fn add(&self, _file_name: &str, bytes: Vec<u8>) -> anyhow::Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());
        Ok(format!("Qm{}", &digest[..40]))
    }

    fn public_url(&self, cid: &str) -> String {
        format!("{}/ipfs/{cid}", self.gateway_url.trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct IpfsManager {
    inner: std::sync::Arc<dyn IpfsStore>,
}

impl IpfsManager {
    pub fn from_env() -> Self {
        let mode = std::env::var("OPENGIG_IPFS_MODE").unwrap_or_else(|_| "mock".into());
        let gateway_url =
            std::env::var("OPENGIG_IPFS_GATEWAY_URL").unwrap_or_else(|_| "https://ipfs.io".into());
        if mode.eq_ignore_ascii_case("http") {
            let api_url = std::env::var("OPENGIG_IPFS_API_URL")
                .unwrap_or_else(|_| "http://localhost:5001".into());
            info!(%api_url, "ipfs store: http gateway");
            return Self {
                inner: std::sync::Arc::new(HttpPinStore {
                    api_url,
                    gateway_url,
                    http: reqwest::Client::new(),
                }),
            };
        }
        info!(%mode, "ipfs store: mock");
        Self { inner: std::sync::Arc::new(MockPinStore { gateway_url }) }
    }

    pub fn store(&self) -> &dyn IpfsStore {
        self.inner.as_ref()
    }
}

static IPFS: once_cell::sync::OnceCell<IpfsManager> = once_cell::sync::OnceCell::new();

pub fn get_ipfs() -> &'static IpfsManager {
    IPFS.get_or_init(IpfsManager::from_env)
}
