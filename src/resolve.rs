//! # Value Resolver
//! Per-field, ordered candidate chains. The first candidate yielding a finite
//! number wins; when all of them come up empty the previous cycle's value is
//! retained. Chains are plain data so they can be loaded from config and
//! enumerated or edited in tests.

use serde::{Deserialize, Serialize};

use crate::ingest::types::UpstreamBatch;
use crate::numeric::{coerce_at, finite};
use crate::series::{mean, SeriesSpec};

pub const DEFAULT_DEPTH_TOP_N: usize = 8;

fn default_top_n() -> usize {
    DEFAULT_DEPTH_TOP_N
}

/// Two-sided market depth: average the top-N valid offers of each side,
/// then take the midpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSpec {
    pub buy_upstream: String,
    pub sell_upstream: String,
    /// Offer prices inside each side's payload, listed best-first.
    pub offers: SeriesSpec,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

/// Mean of the first `top_n` strictly positive offers.
pub fn avg_top_offers(prices: &[f64], top_n: usize) -> Option<f64> {
    let top: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .take(top_n)
        .collect();
    mean(&top)
}

impl DepthSpec {
    pub fn side(&self, batch: &UpstreamBatch, upstream: &str) -> Option<f64> {
        let prices = self.offers.extract(batch.payload(upstream)?)?;
        avg_top_offers(&prices, self.top_n)
    }

    /// Midpoint when both sides produced a value; absent otherwise so the
    /// chain moves on to its single-sided fallback.
    pub fn midpoint(&self, batch: &UpstreamBatch) -> Option<f64> {
        let buy = self.side(batch, &self.buy_upstream)?;
        let sell = self.side(batch, &self.sell_upstream)?;
        finite((buy + sell) / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provider {
    /// A literal value (manual overrides, tests).
    Direct { value: Option<f64> },
    /// Number at a JSON pointer inside one upstream payload.
    Pointer { upstream: String, pointer: String },
    /// Newest element of a series inside one upstream payload.
    SeriesLast { upstream: String, series: SeriesSpec },
    Depth(DepthSpec),
    /// The previous cycle's resolved value.
    Previous,
}

impl Provider {
    pub fn evaluate(&self, batch: &UpstreamBatch, previous: Option<f64>) -> Option<f64> {
        match self {
            Provider::Direct { value } => value.and_then(finite),
            Provider::Pointer { upstream, pointer } => {
                coerce_at(batch.payload(upstream)?, pointer)
            }
            Provider::SeriesLast { upstream, series } => {
                series.extract(batch.payload(upstream)?)?.last().copied()
            }
            Provider::Depth(spec) => spec.midpoint(batch),
            Provider::Previous => previous.and_then(finite),
        }
    }

    pub fn is_previous(&self) -> bool {
        matches!(self, Provider::Previous)
    }
}

/// A named provider; `label` is user-facing provenance text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub provider: Provider,
}

impl Candidate {
    pub fn new(name: impl Into<String>, provider: Provider) -> Self {
        Self {
            name: name.into(),
            label: None,
            provider,
        }
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn direct(name: &str, value: Option<f64>) -> Self {
        Self::new(name, Provider::Direct { value })
    }

    pub fn pointer(name: &str, upstream: &str, pointer: &str) -> Self {
        Self::new(
            name,
            Provider::Pointer {
                upstream: upstream.to_string(),
                pointer: pointer.to_string(),
            },
        )
    }

    pub fn series_last(name: &str, upstream: &str, series: SeriesSpec) -> Self {
        Self::new(
            name,
            Provider::SeriesLast {
                upstream: upstream.to_string(),
                series,
            },
        )
    }

    pub fn previous() -> Self {
        Self::new("previous", Provider::Previous)
    }
}

/// Outcome of evaluating a chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub value: Option<f64>,
    /// Name of the winning candidate; `None` when nothing won.
    pub source: Option<String>,
    /// Provenance text of the winning candidate.
    pub provenance: Option<String>,
    /// True when the value came from this cycle's upstream data.
    pub live: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateChain {
    pub candidates: Vec<Candidate>,
}

impl CandidateChain {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    pub fn names(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.name.as_str()).collect()
    }

    /// Upstreams this chain reads from, in chain order.
    pub fn upstreams(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for c in &self.candidates {
            match &c.provider {
                Provider::Pointer { upstream, .. } | Provider::SeriesLast { upstream, .. } => {
                    out.push(upstream.as_str())
                }
                Provider::Depth(d) => {
                    out.push(d.buy_upstream.as_str());
                    out.push(d.sell_upstream.as_str());
                }
                Provider::Direct { .. } | Provider::Previous => {}
            }
        }
        out
    }

    /// Evaluate in order; first finite result wins. Exhausted chains retain
    /// `previous` (never reverting a populated field to absent).
    pub fn resolve(&self, batch: &UpstreamBatch, previous: Option<f64>) -> Resolution {
        for c in &self.candidates {
            if let Some(v) = c.provider.evaluate(batch, previous) {
                return Resolution {
                    value: Some(v),
                    source: Some(c.name.clone()),
                    provenance: Some(c.label.clone().unwrap_or_else(|| c.name.clone())),
                    live: !c.provider.is_previous(),
                };
            }
        }
        Resolution {
            value: previous.and_then(finite),
            source: None,
            provenance: None,
            live: false,
        }
    }
}

/// A named series source for charting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSource {
    pub name: String,
    pub upstream: String,
    pub series: SeriesSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesChain {
    pub sources: Vec<SeriesSource>,
}

impl SeriesChain {
    /// First source producing a chartable (≥ 2 points) series.
    pub fn resolve(&self, batch: &UpstreamBatch) -> Option<(String, Vec<f64>)> {
        self.sources.iter().find_map(|s| {
            let series = s.series.extract(batch.payload(&s.upstream)?)?;
            (series.len() >= 2).then(|| (s.name.clone(), series))
        })
    }
}
