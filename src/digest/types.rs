// src/digest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary text of the heuristic brief built when no credentials exist.
/// Entries carrying it are retried as soon as credentials appear.
pub const NO_CREDENTIALS_SUMMARY: &str =
    "OPENAI_API_KEY not configured. AI summary unavailable; showing an automatic headline summary.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub source: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStatus {
    pub source: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brief {
    pub summary: String,
    #[serde(rename = "macro", default)]
    pub macro_points: Vec<String>,
    #[serde(default)]
    pub geo: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

/// Why a heuristic brief was used instead of a generated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NoCredentials,
    QuotaExceeded,
    AiError,
}

/// Persisted server-side cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestCacheEntry {
    pub generated_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub feed_status: Vec<FeedStatus>,
    pub article_count: usize,
    #[serde(default)]
    pub top_headlines: Vec<Article>,
    pub brief: Brief,
    #[serde(default)]
    pub reason: Option<FallbackReason>,
}

impl DigestCacheEntry {
    /// The "no credentials" sentinel. Older entries without `reason` are
    /// recognised by their summary text.
    pub fn is_no_credentials(&self) -> bool {
        self.reason == Some(FallbackReason::NoCredentials)
            || self.brief.summary.contains("OPENAI_API_KEY not configured")
    }

    pub fn to_digest(&self, cache_hit: bool) -> Digest {
        Digest {
            summary: self.brief.summary.clone(),
            macro_points: self.brief.macro_points.clone(),
            geo: self.brief.geo.clone(),
            risks: self.brief.risks.clone(),
            watchlist: self.brief.watchlist.clone(),
            confidence: self.brief.confidence,
            generated_at: self.generated_at,
            valid_until: self.valid_until,
            article_count: self.article_count,
            cache_hit,
            rate_limited: self.reason == Some(FallbackReason::QuotaExceeded),
            reason: self.reason,
        }
    }
}

/// Wire shape of `GET /digest` `data`, and the core's mirror of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Digest {
    pub summary: String,
    #[serde(rename = "macro", default)]
    pub macro_points: Vec<String>,
    #[serde(default)]
    pub geo: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
    pub generated_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub article_count: usize,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default)]
    pub rate_limited: bool,
    #[serde(default)]
    pub reason: Option<FallbackReason>,
}

/// Result of `POST /api/brief`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdHocBrief {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub confidence: Confidence,
}
