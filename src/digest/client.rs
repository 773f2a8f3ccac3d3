// src/digest/client.rs
//! Core side of the digest: fetch it from the collaborator (remote or
//! in-process) and keep a mirror each refresh cycle can read without waiting.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::Digest;
use super::DigestService;
use crate::error::DigestError;

pub const RATE_LIMIT_NOTICE: &str =
    "Digest temporarily limited by the summarizer quota; showing the last available brief.";

#[async_trait]
pub trait DigestClient: Send + Sync {
    async fn get_digest(&self, force: bool) -> Result<Digest, DigestError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    data: Option<Digest>,
    #[serde(default)]
    error: Option<String>,
}

/// `GET {url}?force=0|1` against a remote digest service.
pub struct HttpDigestClient {
    http: reqwest::Client,
    url: String,
}

impl HttpDigestClient {
    pub fn new(url: impl Into<String>) -> Result<Self, DigestError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DigestError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

pub fn force_url(base: &str, force: bool) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}force={}", u8::from(force))
}

/// Turns a response status and body into the client result.
pub fn decode_response(status: u16, body: &str) -> Result<Digest, DigestError> {
    if status == 429 {
        return Err(DigestError::RateLimited);
    }
    if !(200..300).contains(&status) {
        return Err(DigestError::Unavailable(format!("HTTP {status}")));
    }
    let env: Envelope =
        serde_json::from_str(body).map_err(|e| DigestError::Decode(e.to_string()))?;
    match (env.ok, env.data) {
        (true, Some(d)) => Ok(d),
        _ => Err(DigestError::Unavailable(
            env.error.unwrap_or_else(|| "digest not ok".to_string()),
        )),
    }
}

#[async_trait]
impl DigestClient for HttpDigestClient {
    async fn get_digest(&self, force: bool) -> Result<Digest, DigestError> {
        let resp = self
            .http
            .get(force_url(&self.url, force))
            .send()
            .await
            .map_err(|e| DigestError::Unavailable(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| DigestError::Unavailable(e.to_string()))?;
        decode_response(status, &body)
    }
}

/// Same-process digest service.
pub struct LocalDigestClient {
    service: Arc<DigestService>,
}

impl LocalDigestClient {
    pub fn new(service: Arc<DigestService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl DigestClient for LocalDigestClient {
    async fn get_digest(&self, force: bool) -> Result<Digest, DigestError> {
        self.service.get_digest(force).await
    }
}

/// What the core currently displays for the digest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorState {
    pub digest: Option<Digest>,
    /// Set only on an explicit rate-limit signal.
    pub notice: Option<String>,
}

#[derive(Default)]
pub struct DigestMirror {
    inner: ArcSwap<MirrorState>,
}

impl DigestMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror pre-filled from a restored snapshot.
    pub fn seeded(state: MirrorState) -> Self {
        Self {
            inner: ArcSwap::from_pointee(state),
        }
    }

    pub fn load(&self) -> Arc<MirrorState> {
        self.inner.load_full()
    }

    /// Non-rate-limit failures leave the displayed state untouched.
    pub fn apply(&self, result: Result<Digest, DigestError>) {
        let current = self.inner.load_full();
        let next = match result {
            Ok(d) => {
                let notice = d.rate_limited.then(|| RATE_LIMIT_NOTICE.to_string());
                MirrorState {
                    digest: Some(d),
                    notice,
                }
            }
            Err(DigestError::RateLimited) => MirrorState {
                digest: current.digest.clone(),
                notice: Some(RATE_LIMIT_NOTICE.to_string()),
            },
            Err(e) => {
                warn!(target: "digest", error = %e, "digest fetch failed; keeping previous");
                return;
            }
        };
        self.inner.store(Arc::new(next));
    }
}

pub async fn poll_once(client: &dyn DigestClient, mirror: &DigestMirror, force: bool) {
    let res = client.get_digest(force).await;
    if let Ok(d) = &res {
        debug!(target: "digest", cache_hit = d.cache_hit, generated_at = %d.generated_at, "digest polled");
    }
    mirror.apply(res);
}

/// Polls immediately, then every `every`.
pub fn spawn_digest_poller(
    client: Arc<dyn DigestClient>,
    mirror: Arc<DigestMirror>,
    every: Duration,
) -> JoinHandle<()> {
    info!(target: "digest", every_secs = every.as_secs(), "digest poller started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            poll_once(client.as_ref(), &mirror, false).await;
        }
    })
}
