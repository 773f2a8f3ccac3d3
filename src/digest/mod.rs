// src/digest/mod.rs
//! Daily news digest: RSS articles → summarizer (or heuristic fallback) →
//! JSON file cache with a fixed TTL. The core consumes it through
//! [`client::DigestClient`].

pub mod client;
pub mod feeds;
pub mod heuristic;
pub mod summarizer;
pub mod types;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{AiConfig, DigestCfg};
use crate::error::{DigestError, SummarizeError};
use feeds::{default_feeds, ArticleSource, RssArticleSource};
use heuristic::fallback_brief;
use summarizer::{build_summarizer, Summarizer};
use types::{AdHocBrief, Digest, DigestCacheEntry, FallbackReason};

pub const TOP_HEADLINES: usize = 12;

static METRICS_DESCRIBED: OnceCell<()> = OnceCell::new();

pub fn ensure_metrics_described() {
    METRICS_DESCRIBED.get_or_init(|| {
        describe_counter!("digest_requests_total", "Digest requests served.");
        describe_counter!("digest_cache_hits_total", "Digest requests served from cache.");
        describe_counter!(
            "digest_fallbacks_total",
            "Digests built from the heuristic brief, by reason."
        );
        describe_counter!("digest_feed_errors_total", "RSS feeds that failed to load.");
    });
}

/// Where a request lands before anything is regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Serve the cached entry.
    Fresh,
    /// Cached entry was built without credentials, which now exist.
    NoCredentials,
    Expired,
    Missing,
    ForceRequested,
}

impl CacheState {
    pub fn serves_cache(self) -> bool {
        matches!(self, CacheState::Fresh)
    }
}

pub fn classify(
    entry: Option<&DigestCacheEntry>,
    credentialed: bool,
    force: bool,
    now: DateTime<Utc>,
) -> CacheState {
    if force {
        return CacheState::ForceRequested;
    }
    let Some(entry) = entry else {
        return CacheState::Missing;
    };
    if credentialed && entry.is_no_credentials() {
        return CacheState::NoCredentials;
    }
    if now >= entry.valid_until {
        return CacheState::Expired;
    }
    CacheState::Fresh
}

fn fallback_reason(err: &SummarizeError) -> FallbackReason {
    match err {
        SummarizeError::NoCredentials => FallbackReason::NoCredentials,
        SummarizeError::QuotaExceeded => FallbackReason::QuotaExceeded,
        SummarizeError::Failed(_) => FallbackReason::AiError,
    }
}

fn reason_label(reason: FallbackReason) -> &'static str {
    match reason {
        FallbackReason::NoCredentials => "no_credentials",
        FallbackReason::QuotaExceeded => "quota_exceeded",
        FallbackReason::AiError => "ai_error",
    }
}

pub fn read_cache_file(path: &Path) -> Option<DigestCacheEntry> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(target: "digest", path = %path.display(), error = %e, "ignoring unreadable digest cache");
            None
        }
    }
}

pub fn write_cache_file(path: &Path, entry: &DigestCacheEntry) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(entry)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

pub struct DigestService {
    cache_path: PathBuf,
    ttl: Duration,
    articles: Arc<dyn ArticleSource>,
    summarizer: Arc<dyn Summarizer>,
    /// Serializes regeneration so concurrent misses build one entry.
    gate: Mutex<()>,
}

impl DigestService {
    pub fn new(
        cache_path: impl Into<PathBuf>,
        ttl_hours: u64,
        articles: Arc<dyn ArticleSource>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            cache_path: cache_path.into(),
            ttl: Duration::hours(ttl_hours.max(1) as i64),
            articles,
            summarizer,
            gate: Mutex::new(()),
        }
    }

    /// Live RSS feeds plus whichever summarizer the environment selects.
    pub fn from_config(cfg: &DigestCfg, ai: &AiConfig) -> Result<Self, DigestError> {
        let articles = Arc::new(RssArticleSource::new(default_feeds())?);
        let summarizer =
            build_summarizer(ai).map_err(|e| DigestError::Unavailable(e.to_string()))?;
        info!(
            target: "digest",
            provider = summarizer.provider_name(),
            cache = %cfg.cache_path.display(),
            "digest service ready"
        );
        Ok(Self::new(cfg.cache_path.clone(), cfg.ttl_hours, articles, summarizer))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn credentialed(&self) -> bool {
        self.summarizer.credentialed()
    }

    pub fn provider_name(&self) -> &'static str {
        self.summarizer.provider_name()
    }

    pub fn cached(&self) -> Option<DigestCacheEntry> {
        read_cache_file(&self.cache_path)
    }

    pub async fn get_digest(&self, force: bool) -> Result<Digest, DigestError> {
        self.get_digest_at(force, Utc::now()).await
    }

    /// Serves the cache when fresh, otherwise regenerates and persists.
    /// Summarizer failures never surface: they become a heuristic brief.
    pub async fn get_digest_at(
        &self,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Digest, DigestError> {
        counter!("digest_requests_total").increment(1);
        let _guard = self.gate.lock().await;

        let cached = self.cached();
        let state = classify(cached.as_ref(), self.credentialed(), force, now);
        if let (true, Some(entry)) = (state.serves_cache(), cached.as_ref()) {
            counter!("digest_cache_hits_total").increment(1);
            debug!(target: "digest", valid_until = %entry.valid_until, "serving cached digest");
            return Ok(entry.to_digest(true));
        }
        info!(target: "digest", ?state, "regenerating digest");

        let collected = self.articles.collect().await?;
        let (brief, reason) = match self.summarizer.summarize(&collected.articles).await {
            Ok(brief) => (brief, None),
            Err(err) => {
                let reason = fallback_reason(&err);
                warn!(target: "digest", error = %err, "summarizer unavailable, using headline brief");
                counter!("digest_fallbacks_total", "reason" => reason_label(reason)).increment(1);
                (fallback_brief(&collected.articles, reason), Some(reason))
            }
        };

        let entry = DigestCacheEntry {
            generated_at: now,
            valid_until: now + self.ttl,
            feed_status: collected.feed_status,
            article_count: collected.articles.len(),
            top_headlines: collected.articles.into_iter().take(TOP_HEADLINES).collect(),
            brief,
            reason,
        };
        if let Err(e) = write_cache_file(&self.cache_path, &entry) {
            warn!(target: "digest", error = %e, "failed to persist digest cache");
        }
        Ok(entry.to_digest(false))
    }

    /// Free-form brief over caller-supplied text. Not cached.
    pub async fn brief(&self, text: &str, scope: &str) -> Result<AdHocBrief, SummarizeError> {
        self.summarizer.brief_text(text, scope).await
    }
}
