//! Dossier: binary entrypoint.
//! Loads config, restores the last snapshot, starts the refresh loop and the
//! digest poller, and serves the Axum router on Shuttle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dossier::api::{self, AppState};
use dossier::config::{AiConfig, AppConfig};
use dossier::digest::client::{
    spawn_digest_poller, DigestClient, DigestMirror, HttpDigestClient, LocalDigestClient,
};
use dossier::digest::DigestService;
use dossier::ingest::http::HttpFetcher;
use dossier::metrics::Metrics;
use dossier::scheduler::Refresher;
use dossier::snapshot::{FileBlobStore, SnapshotCache, SnapshotHandle};

const ENV_LOG_JSON: &str = "DOSSIER_LOG_JSON";
const MIN_DIGEST_POLL_SECS: u64 = 60;

/// Best-effort: the Shuttle runtime may already own a global subscriber.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dossier=info,warn"));
    let json = std::env::var(ENV_LOG_JSON).is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Arc::new(AppConfig::load().context("loading dossier config")?);
    let ai = AiConfig::from_env();
    let metrics = Metrics::init(&cfg)?;

    // --- Digest: in-process service, consumed locally or from DIGEST_URL ---
    let digest_service = Arc::new(
        DigestService::from_config(&cfg.digest, &ai).context("building digest service")?,
    );
    let digest_client: Arc<dyn DigestClient> = match &cfg.digest.url {
        Some(url) => {
            info!(target: "digest", url = %url, "using remote digest service");
            Arc::new(HttpDigestClient::new(url.clone()).context("building digest client")?)
        }
        None => Arc::new(LocalDigestClient::new(Arc::clone(&digest_service))),
    };

    // --- Warm start from the last snapshot ---
    let cache = SnapshotCache::new(
        Arc::new(FileBlobStore::new(cfg.snapshot.dir.clone())),
        cfg.snapshot.key.clone(),
    );
    let initial = cache.load().unwrap_or_default();
    let mirror = Arc::new(DigestMirror::seeded(initial.digest.clone()));
    let handle = Arc::new(SnapshotHandle::new(initial));

    // --- Refresh loop ---
    let fetcher = Arc::new(HttpFetcher::new().context("building upstream http client")?);
    let refresher = Refresher::new(
        Arc::clone(&cfg),
        cfg.upstreams(),
        fetcher,
        handle,
        Some(cache),
        Arc::clone(&mirror),
    );
    refresher.spawn();
    spawn_digest_poller(
        digest_client,
        mirror,
        Duration::from_secs(cfg.digest.poll_secs.max(MIN_DIGEST_POLL_SECS)),
    );

    let state = AppState {
        refresher,
        digest: digest_service,
        model: ai.model.clone(),
    };
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
