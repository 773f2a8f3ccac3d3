// src/config/app.rs
//! Application config: upstream catalog, tracked fields with their candidate
//! chains, composite indices, refresh cadence, persistence and digest wiring.
//!
//! Lookup order:
//! 1) $DOSSIER_CONFIG_PATH
//! 2) config/dossier.toml
//! 3) the copy embedded at build time

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::composite::DEFAULT_SPIKE_RATIO;
use crate::ingest::types::Upstream;
use crate::resolve::{CandidateChain, SeriesChain};
use crate::series::{SeriesSpec, DISPLAY_LEN, INTERNAL_LEN};
use crate::staleness::FieldKind;

pub const DEFAULT_CONFIG_PATH: &str = "config/dossier.toml";
pub const ENV_CONFIG_PATH: &str = "DOSSIER_CONFIG_PATH";
pub const ENV_REFRESH_INTERVAL: &str = "REFRESH_INTERVAL_SECS";
pub const ENV_DIGEST_URL: &str = "DIGEST_URL";

const EMBEDDED_CONFIG: &str = include_str!("../../config/dossier.toml");

fn default_interval_secs() -> u64 {
    60
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_lookback_hours() -> u64 {
    24
}
fn default_display_len() -> usize {
    DISPLAY_LEN
}
fn default_internal_len() -> usize {
    INTERNAL_LEN
}
fn default_steps_back() -> usize {
    24
}
fn default_spike_ratio() -> f64 {
    DEFAULT_SPIKE_RATIO
}
fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("state")
}
fn default_snapshot_key() -> String {
    "dossier_snapshot".to_string()
}
fn default_digest_poll_secs() -> u64 {
    1800
}
fn default_digest_cache_path() -> PathBuf {
    PathBuf::from("cache/news_daily_brief.json")
}
fn default_digest_ttl_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshCfg {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    #[serde(default = "default_display_len")]
    pub display_len: usize,
    #[serde(default = "default_internal_len")]
    pub internal_len: usize,
}

impl Default for RefreshCfg {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            lookback_hours: default_lookback_hours(),
            display_len: default_display_len(),
            internal_len: default_internal_len(),
        }
    }
}

impl RefreshCfg {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1))
    }

    pub fn lookback_ms(&self) -> i64 {
        (self.lookback_hours as i64) * 3_600_000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCfg {
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_snapshot_key")]
    pub key: String,
}

impl Default for SnapshotCfg {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
            key: default_snapshot_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestCfg {
    /// Remote digest endpoint; when absent the in-process service is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_digest_poll_secs")]
    pub poll_secs: u64,
    #[serde(default = "default_digest_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_digest_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for DigestCfg {
    fn default() -> Self {
        Self {
            url: None,
            poll_secs: default_digest_poll_secs(),
            cache_path: default_digest_cache_path(),
            ttl_hours: default_digest_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamCfg {
    pub name: String,
    pub url: String,
    /// JSON body; when present the upstream is fetched with POST.
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub max_age_minutes: Option<u32>,
    #[serde(default = "default_steps_back")]
    pub change_steps_back: usize,
    pub candidates: CandidateChain,
    #[serde(default)]
    pub series: SeriesChain,
}

impl FieldSpec {
    pub fn max_age_minutes(&self) -> u32 {
        self.max_age_minutes
            .unwrap_or_else(|| self.kind.default_max_age_minutes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub key: String,
    pub label: String,
    pub upstream: String,
    /// Array of entities inside the payload.
    pub entities: String,
    /// Entity display name, relative to each entity.
    #[serde(default)]
    pub name: Option<String>,
    /// Sub-series, relative to each entity.
    pub series: SeriesSpec,
    #[serde(default = "default_spike_ratio")]
    pub spike_ratio: f64,
    #[serde(default)]
    pub max_age_minutes: Option<u32>,
}

impl IndexSpec {
    pub fn history_key(&self) -> String {
        format!("index:{}", self.key)
    }

    pub fn max_age_minutes(&self) -> u32 {
        self.max_age_minutes
            .unwrap_or_else(|| FieldKind::Index.default_max_age_minutes())
    }
}

/// Where the "source updated at" stamp lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampCfg {
    pub upstream: String,
    pub pointer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub refresh: RefreshCfg,
    #[serde(default)]
    pub snapshot: SnapshotCfg,
    #[serde(default)]
    pub digest: DigestCfg,
    #[serde(default)]
    pub source_stamp: Option<StampCfg>,
    #[serde(default)]
    pub upstreams: Vec<UpstreamCfg>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub indices: Vec<IndexSpec>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing dossier config")?;
        cfg.check_references();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Env path, then the default path, then the embedded copy. Env
    /// overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => Self::load_from(Path::new(&p))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => Self::embedded()?,
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(EMBEDDED_CONFIG)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = lookup(ENV_REFRESH_INTERVAL).and_then(|v| v.trim().parse().ok()) {
            self.refresh.interval_secs = secs;
        }
        if let Some(url) = lookup(ENV_DIGEST_URL).filter(|v| !v.trim().is_empty()) {
            self.digest.url = Some(url);
        }
    }

    /// Resolve `${VAR}` placeholders; upstreams with a missing variable are
    /// disabled rather than dropped so their candidates simply stay absent.
    pub fn upstreams_with<F>(&self, lookup: F) -> Vec<Upstream>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.upstreams
            .iter()
            .map(|u| match expand_env(&u.url, &lookup) {
                Ok(url) => Upstream {
                    name: u.name.clone(),
                    url: Some(url),
                    body: u.body.clone(),
                    disabled_reason: None,
                },
                Err(var) => {
                    tracing::warn!(upstream = %u.name, var = %var, "upstream disabled: missing env var");
                    Upstream::disabled(&u.name, format!("missing env var {var}"))
                }
            })
            .collect()
    }

    pub fn upstreams(&self) -> Vec<Upstream> {
        self.upstreams_with(|k| std::env::var(k).ok())
    }

    /// Warn about chains that point at upstreams nobody configured.
    fn check_references(&self) {
        let known: BTreeSet<&str> = self.upstreams.iter().map(|u| u.name.as_str()).collect();
        for f in &self.fields {
            let series_ups = f.series.sources.iter().map(|s| s.upstream.as_str());
            for up in f.candidates.upstreams().into_iter().chain(series_ups) {
                if !known.contains(up) {
                    tracing::warn!(field = %f.key, upstream = %up, "field references unknown upstream");
                }
            }
        }
        for ix in &self.indices {
            if !known.contains(ix.upstream.as_str()) {
                tracing::warn!(index = %ix.key, upstream = %ix.upstream, "index references unknown upstream");
            }
        }
    }
}

/// Replace every `${VAR}` with its value; `Err(VAR)` on the first missing one.
pub fn expand_env<F>(template: &str, lookup: &F) -> std::result::Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    static RE_VAR: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = RE_VAR.get_or_init(|| regex::Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("env var regex"));

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = lookup(var.as_str())
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| var.as_str().to_string())?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}
