// src/ingest/mod.rs
//! Upstream fan-out/fan-in.
//!
//! Every upstream gets its own task and its own timeout; the cycle waits for
//! all of them before any resolution runs. A failed or slow upstream only
//! turns into an `Err` entry in the batch, siblings are never cancelled.

pub mod http;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::types::{Fetcher, Upstream, UpstreamBatch};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("upstream_fetches_total", "Upstream fetch attempts.");
        describe_counter!(
            "upstream_errors_total",
            "Upstream fetches that failed, timed out or carried an API error note."
        );
        describe_histogram!("upstream_fetch_ms", "Upstream fetch latency in milliseconds.");
    });
}

/// Error notes some upstreams return with HTTP 200 (rate limit, bad key).
pub fn api_error_note(payload: &Value) -> Option<String> {
    ["Note", "Information", "Error Message"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Strip credentials from a URL before it reaches the logs.
pub fn redact_url(url: &str) -> String {
    static RE_KEY: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_KEY.get_or_init(|| {
        regex::Regex::new(r"(?i)((?:api_?key|token|key)=)[^&]+").expect("redact regex")
    });
    re.replace_all(url, "${1}***").into_owned()
}

/// Fetch every upstream concurrently, each bounded by `timeout`, and wait
/// for all of them.
pub async fn fetch_batch(
    fetcher: Arc<dyn Fetcher>,
    upstreams: &[Upstream],
    timeout: Duration,
) -> UpstreamBatch {
    ensure_metrics_described();

    let mut handles = Vec::with_capacity(upstreams.len());
    for up in upstreams.iter().cloned() {
        let fetcher = Arc::clone(&fetcher);
        let task_up = up.clone();
        let handle = tokio::spawn(async move {
            let t0 = Instant::now();
            let res = match tokio::time::timeout(timeout, fetcher.fetch(&task_up)).await {
                Ok(Ok(payload)) => match api_error_note(&payload) {
                    Some(note) => Err(FetchError::Api(note)),
                    None => Ok(payload),
                },
                Ok(Err(e)) => Err(e),
                Err(_) => Err(FetchError::Timeout {
                    upstream: task_up.name.clone(),
                    ms: timeout.as_millis() as u64,
                }),
            };
            histogram!("upstream_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
            res
        });
        handles.push((up, handle));
    }

    let mut batch = UpstreamBatch::new();
    for (up, handle) in handles {
        counter!("upstream_fetches_total").increment(1);
        let res = match handle.await {
            Ok(res) => res,
            Err(e) => Err(FetchError::Join(e.to_string())),
        };
        if let Err(e) = &res {
            counter!("upstream_errors_total", "upstream" => up.name.clone()).increment(1);
            match e {
                FetchError::Disabled(_) => {
                    tracing::debug!(target: "ingest", upstream = %up.name, error = %e, "upstream skipped")
                }
                _ => tracing::warn!(
                    target: "ingest",
                    upstream = %up.name,
                    url = %up.url.as_deref().map(redact_url).unwrap_or_default(),
                    error = %e,
                    "upstream unavailable"
                ),
            }
        }
        batch.insert(up.name, res);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_notes_are_detected() {
        assert_eq!(
            api_error_note(&json!({"Note": "Thank you for using Alpha Vantage!"})).as_deref(),
            Some("Thank you for using Alpha Vantage!")
        );
        assert!(api_error_note(&json!({"Global Quote": {}})).is_none());
    }

    #[test]
    fn api_keys_are_redacted() {
        let u = "https://www.alphavantage.co/query?function=GLOBAL_QUOTE&symbol=GLD&apikey=SECRET";
        let r = redact_url(u);
        assert!(!r.contains("SECRET"));
        assert!(r.ends_with("apikey=***"));
    }
}
