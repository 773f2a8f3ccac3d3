// tests/refresh_coalescing.rs
//
// Refresh loop concurrency: triggers while a cycle is in flight collapse into
// one follow-up cycle, and a slow upstream only costs its own timeout.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};

use common::{config, fixture, CannedFetcher};
use dossier::digest::client::DigestMirror;
use dossier::error::FetchError;
use dossier::ingest::fetch_batch;
use dossier::ingest::types::{Fetcher, Upstream};
use dossier::scheduler::Refresher;
use dossier::snapshot::{MemoryBlobStore, SnapshotCache, SnapshotHandle};

/// Reports each fetch on `entered`, then blocks until the test hands out a
/// permit.
struct GatedFetcher {
    entered: mpsc::UnboundedSender<()>,
    gate: Arc<Semaphore>,
    calls: AtomicUsize,
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, _upstream: &Upstream) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.entered.send(());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        permit.forget();
        Ok(fixture("coingecko_simple.json"))
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

fn slow_config() -> Arc<dossier::config::AppConfig> {
    let mut cfg = config();
    cfg.refresh.interval_secs = 3600;
    Arc::new(cfg)
}

#[tokio::test]
async fn triggers_during_a_cycle_coalesce_into_one() {
    let (tx, mut entered) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));
    let fetcher = Arc::new(GatedFetcher {
        entered: tx,
        gate: Arc::clone(&gate),
        calls: AtomicUsize::new(0),
    });

    let refresher = Refresher::new(
        slow_config(),
        vec![Upstream::new("coingecko_simple", "http://unused")],
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::new(SnapshotHandle::default()),
        None,
        Arc::new(DigestMirror::new()),
    );
    let mut done = refresher.completed();
    let task = refresher.spawn();

    // Startup cycle is blocked inside its fetch.
    entered.recv().await.expect("first cycle entered");
    for _ in 0..3 {
        refresher.trigger();
    }
    gate.add_permits(1);

    // Exactly one follow-up cycle starts.
    entered.recv().await.expect("follow-up cycle entered");
    gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(5), done.wait_for(|n| *n >= 2))
        .await
        .expect("two cycles in time")
        .expect("refresher alive");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(*done.borrow(), 2);
    assert_eq!(refresher.snapshot().cycle, 2);
    assert_eq!(refresher.snapshot().value("btc"), Some(63250.5));

    task.abort();
}

#[tokio::test]
async fn run_once_publishes_and_persists() {
    let fetcher = CannedFetcher::default().ok("coingecko_simple", fixture("coingecko_simple.json"));
    let store = Arc::new(MemoryBlobStore::new());
    let cache = SnapshotCache::new(store, "k");
    let refresher = Refresher::new(
        slow_config(),
        vec![
            Upstream::new("coingecko_simple", "http://unused"),
            Upstream::new("av_gld", "http://unused"),
        ],
        Arc::new(fetcher),
        Arc::new(SnapshotHandle::default()),
        Some(cache.clone()),
        Arc::new(DigestMirror::new()),
    );

    let published = refresher.run_once().await;
    assert_eq!(published.cycle, 1);
    assert_eq!(published.value("btc"), Some(63250.5));
    assert_eq!(published.value("gold"), None);
    assert_eq!(refresher.snapshot(), published);
    assert_eq!(cache.load().as_ref(), Some(published.as_ref()));
}

/// Sleeps far past the fetch timeout for one upstream only.
struct SlowOne;

#[async_trait]
impl Fetcher for SlowOne {
    async fn fetch(&self, upstream: &Upstream) -> Result<Value, FetchError> {
        if upstream.name == "slow" {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(fixture("coingecko_simple.json"))
    }

    fn name(&self) -> &'static str {
        "slow-one"
    }
}

#[tokio::test]
async fn slow_upstream_times_out_without_holding_siblings() {
    let upstreams = vec![
        Upstream::new("fast_a", "http://unused"),
        Upstream::new("slow", "http://unused"),
        Upstream::new("fast_b", "http://unused"),
    ];
    let t0 = Instant::now();
    let batch = fetch_batch(Arc::new(SlowOne), &upstreams, Duration::from_millis(100)).await;

    assert!(t0.elapsed() < Duration::from_secs(5));
    assert_eq!(batch.ok_count(), 2);
    assert!(batch.payload("fast_a").is_some());
    assert!(batch.payload("fast_b").is_some());
    assert!(matches!(
        batch.error("slow"),
        Some(FetchError::Timeout { upstream, ms: 100 }) if upstream == "slow"
    ));
}

#[tokio::test]
async fn api_error_notes_count_as_unavailable() {
    let fetcher = CannedFetcher::default()
        .ok("av_gld", fixture("av_note.json"))
        .ok("coingecko_simple", fixture("coingecko_simple.json"));
    let upstreams = vec![
        Upstream::new("av_gld", "http://unused"),
        Upstream::new("coingecko_simple", "http://unused"),
        Upstream::disabled("av_spy", "missing env var ALPHA_VANTAGE_KEY"),
    ];
    let batch = fetch_batch(Arc::new(fetcher), &upstreams, Duration::from_secs(1)).await;

    assert!(matches!(batch.error("av_gld"), Some(FetchError::Api(_))));
    assert!(batch.payload("coingecko_simple").is_some());
    assert!(batch.error("av_spy").is_some());
}
