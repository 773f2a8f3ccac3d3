//! Error taxonomy shared by the refresh cycle, persistence and the digest path.
//!
//! None of these ever abort a refresh cycle: fetch errors are absorbed by the
//! candidate chains, persistence errors are logged, and summarizer errors turn
//! into a heuristic brief.

use thiserror::Error;

/// Why an upstream produced no payload this cycle (UpstreamUnavailable).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream `{upstream}` timed out after {ms}ms")]
    Timeout { upstream: String, ms: u64 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    /// HTTP 200 carrying an error note (rate limit, bad key, unknown symbol).
    #[error("upstream api error: {0}")]
    Api(String),
    #[error("decode error: {0}")]
    Decode(String),
    /// Upstream switched off at config load (e.g. missing API key).
    #[error("upstream disabled: {0}")]
    Disabled(String),
    #[error("fetch task failed: {0}")]
    Join(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(s) => FetchError::Status(s.as_u16()),
            None if e.is_decode() => FetchError::Decode(e.to_string()),
            None => FetchError::Transport(e.to_string()),
        }
    }
}

/// Snapshot blob read/write failures (PersistenceFailure).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encode: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("snapshot decode: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("snapshot schema version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
}

/// Failure of the external text generator behind the digest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SummarizeError {
    #[error("no summarizer credentials configured")]
    NoCredentials,
    #[error("summarizer quota exceeded")]
    QuotaExceeded,
    #[error("summarizer failed: {0}")]
    Failed(String),
}

/// Failure of the core's digest request (DigestFailure/QuotaExceeded).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest service is rate-limited")]
    RateLimited,
    #[error("digest service unavailable: {0}")]
    Unavailable(String),
    #[error("digest payload invalid: {0}")]
    Decode(String),
}
