// src/scheduler.rs
//! Refresh loop: one task runs cycles back to back, never two at once.
//!
//! Wake-ups come from a fixed interval or from [`Refresher::trigger`]. Manual
//! triggers use a `Notify` permit, so any number of triggers while a cycle is
//! in flight collapse into exactly one follow-up cycle. The interval is reset
//! after every cycle, so ticks that fell due mid-cycle are dropped.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::cycle::run_cycle;
use crate::digest::client::DigestMirror;
use crate::ingest::fetch_batch;
use crate::ingest::types::{Fetcher, Upstream};
use crate::snapshot::{Snapshot, SnapshotCache, SnapshotHandle};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("refresh_cycles_total", "Completed refresh cycles.");
        describe_histogram!("refresh_cycle_ms", "Refresh cycle duration in milliseconds.");
        describe_gauge!("fields_resolved_live", "Fields resolved from live data last cycle.");
        describe_gauge!("fields_stale", "Fields flagged stale after the last cycle.");
        describe_counter!("snapshot_write_errors_total", "Failed snapshot writes.");
    });
}

struct Inner {
    cfg: Arc<AppConfig>,
    upstreams: Vec<Upstream>,
    fetcher: Arc<dyn Fetcher>,
    handle: Arc<SnapshotHandle>,
    cache: Option<SnapshotCache>,
    digest: Arc<DigestMirror>,
    trigger: Notify,
    cycle_lock: Mutex<()>,
    completed: watch::Sender<u64>,
}

#[derive(Clone)]
pub struct Refresher {
    inner: Arc<Inner>,
}

impl Refresher {
    pub fn new(
        cfg: Arc<AppConfig>,
        upstreams: Vec<Upstream>,
        fetcher: Arc<dyn Fetcher>,
        handle: Arc<SnapshotHandle>,
        cache: Option<SnapshotCache>,
        digest: Arc<DigestMirror>,
    ) -> Self {
        ensure_metrics_described();
        let (completed, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                cfg,
                upstreams,
                fetcher,
                handle,
                cache,
                digest,
                trigger: Notify::new(),
                cycle_lock: Mutex::new(()),
                completed,
            }),
        }
    }

    /// Request a cycle. Coalesces with any already pending request.
    pub fn trigger(&self) {
        self.inner.trigger.notify_one();
    }

    /// Number of cycles completed since this refresher was built.
    pub fn completed(&self) -> watch::Receiver<u64> {
        self.inner.completed.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.handle.load()
    }

    pub fn handle(&self) -> Arc<SnapshotHandle> {
        Arc::clone(&self.inner.handle)
    }

    /// Fetch, resolve, publish, persist. Concurrent callers are serialized.
    pub async fn run_once(&self) -> Arc<Snapshot> {
        let inner = &self.inner;
        let _guard = inner.cycle_lock.lock().await;
        let t0 = Instant::now();

        let batch = fetch_batch(
            Arc::clone(&inner.fetcher),
            &inner.upstreams,
            inner.cfg.refresh.fetch_timeout(),
        )
        .await;

        let prev = inner.handle.load();
        let digest = inner.digest.load();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let next = run_cycle(&inner.cfg, &batch, &prev, &digest, now_ms);
        let published = inner.handle.publish(next);

        if let Some(cache) = &inner.cache {
            cache.save_logged(&published);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        counter!("refresh_cycles_total").increment(1);
        histogram!("refresh_cycle_ms").record(ms);
        gauge!("fields_resolved_live").set(published.live_count() as f64);
        gauge!("fields_stale").set(published.stale_count() as f64);

        if let Some(err) = &published.error {
            warn!(target: "refresh", cycle = published.cycle, error = %err, "cycle degraded");
        }
        info!(
            target: "refresh",
            cycle = published.cycle,
            live = published.live_count(),
            stale = published.stale_count(),
            upstream_ok = batch.ok_count(),
            upstream_failed = batch.error_count(),
            ms = ms as u64,
            "refresh cycle complete"
        );

        inner.completed.send_modify(|n| *n += 1);
        published
    }

    /// Run one cycle right away, then on every tick or trigger.
    pub fn spawn(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let period = this.inner.cfg.refresh.interval();
            info!(target: "refresh", every_secs = period.as_secs(), "refresh loop started");
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            this.run_once().await;
            ticker.reset();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = this.inner.trigger.notified() => {
                        info!(target: "refresh", "manual refresh");
                    }
                }
                this.run_once().await;
                ticker.reset();
            }
        })
    }
}
