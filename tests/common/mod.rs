// tests/common/mod.rs
// Shared fixtures and fakes for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use dossier::config::AppConfig;
use dossier::error::FetchError;
use dossier::ingest::types::{Fetcher, Upstream, UpstreamBatch};

pub const T0: i64 = 1_760_400_000_000;
pub const HOUR: i64 = 3_600_000;
pub const MINUTE: i64 = 60_000;

pub fn fixture_str(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

pub fn fixture(name: &str) -> Value {
    serde_json::from_str(&fixture_str(name)).expect("fixture json")
}

pub fn config() -> AppConfig {
    AppConfig::embedded().expect("embedded config parses")
}

/// Every default upstream answering, except the SPY quote (HTTP 503) and
/// the silver quote (rate-limit note).
pub fn full_batch() -> UpstreamBatch {
    UpstreamBatch::new()
        .with("coingecko_simple", fixture("coingecko_simple.json"))
        .with("coingecko_chart", fixture("coingecko_chart.json"))
        .with("binance_klines", fixture("binance_klines.json"))
        .with("av_gld", fixture("av_gld.json"))
        .with_error("av_slv", FetchError::Api("rate limited".into()))
        .with_error("av_spy", FetchError::Status(503))
        .with("av_wti", fixture("av_wti.json"))
        .with("dolarapi_oficial", fixture("dolarapi_oficial.json"))
        .with("dolarapi_paralelo", fixture("dolarapi_paralelo.json"))
        .with("p2p_buy", fixture("p2p_buy.json"))
        .with("p2p_sell", fixture("p2p_sell.json"))
        .with("attention", fixture("attention.json"))
}

/// Every upstream failing.
pub fn dead_batch(cfg: &AppConfig) -> UpstreamBatch {
    cfg.upstreams.iter().fold(UpstreamBatch::new(), |b, u| {
        b.with_error(&u.name, FetchError::Transport("connection refused".into()))
    })
}

pub fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}

/// Answers from a fixed table; unknown upstreams get HTTP 404.
#[derive(Default)]
pub struct CannedFetcher {
    pub payloads: HashMap<String, Result<Value, FetchError>>,
    pub calls: AtomicUsize,
}

impl CannedFetcher {
    pub fn ok(mut self, name: &str, v: Value) -> Self {
        self.payloads.insert(name.to_string(), Ok(v));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CannedFetcher {
    async fn fetch(&self, upstream: &Upstream) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads
            .get(&upstream.name)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}
