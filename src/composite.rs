//! # Composite Index
//! Combines several variable-length sub-series (one per contributing entity)
//! into a single index series, plus a current score and baseline.
//!
//! The score (mean of each entity's latest value) and the last point of the
//! combined series (position-aligned mean) are computed independently and
//! can differ; both are kept.

use serde::{Deserialize, Serialize};

use crate::change::{windowed_change, ChangeMode};
use crate::history::FieldHistory;
use crate::series::{compact, mean, DISPLAY_LEN};

pub const DEFAULT_SPIKE_RATIO: f64 = 0.5;

/// One contributing entity's sub-series.
#[derive(Debug, Clone, PartialEq)]
pub struct SubSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeIndex {
    pub key: String,
    pub label: String,
    pub score: Option<f64>,
    pub series: Vec<f64>,
    pub change_pct: Option<f64>,
    #[serde(default)]
    pub change_mode: ChangeMode,
    pub spike_count: usize,
    pub baseline: Option<f64>,
    pub contributors: usize,
    pub last_observed_at: Option<i64>,
    #[serde(default)]
    pub stale: bool,
}

/// Position-wise mean across sub-series aligned at index 0. Shorter series
/// stop contributing; positions nobody covers are skipped.
pub fn combine(series: &[Vec<f64>]) -> Vec<f64> {
    let max_len = series.iter().map(Vec::len).max().unwrap_or(0);
    let mut out = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let at_i: Vec<f64> = series
            .iter()
            .filter_map(|s| s.get(i).copied())
            .filter(|v| v.is_finite())
            .collect();
        if let Some(m) = mean(&at_i) {
            out.push(m);
        }
    }
    out
}

/// Unweighted mean of every entity's latest value.
pub fn current_score(subs: &[SubSeries]) -> Option<f64> {
    let latest: Vec<f64> = subs.iter().filter_map(|s| s.values.last().copied()).collect();
    mean(&latest)
}

/// Entities whose latest value is at least `(1 + ratio)` × their own mean.
pub fn spike_count(subs: &[SubSeries], ratio: f64) -> usize {
    subs.iter()
        .filter(|s| {
            match (s.values.last(), mean(&s.values)) {
                (Some(&last), Some(avg)) if avg > 0.0 => last >= avg * (1.0 + ratio),
                _ => false,
            }
        })
        .count()
}

/// Mean of the index's own track record, or of the freshly built series
/// when there is no history yet.
pub fn baseline(history: Option<&FieldHistory>, combined: &[f64]) -> Option<f64> {
    match history {
        Some(h) if !h.is_empty() => {
            let vals: Vec<f64> = h.values().collect();
            mean(&vals)
        }
        _ => mean(combined),
    }
}

/// Everything derivable from this cycle's sub-series; history-dependent
/// parts (baseline, change) are filled by [`finish`].
pub struct Built {
    pub score: Option<f64>,
    pub series: Vec<f64>,
    pub spike_count: usize,
    pub contributors: usize,
}

pub fn build(subs: &[SubSeries], spike_ratio: f64) -> Built {
    let raw: Vec<Vec<f64>> = subs.iter().map(|s| s.values.clone()).collect();
    Built {
        score: current_score(subs),
        series: compact(combine(&raw), DISPLAY_LEN),
        spike_count: spike_count(subs, spike_ratio),
        contributors: subs.iter().filter(|s| !s.values.is_empty()).count(),
    }
}

/// Attach baseline and windowed change from the index's history (which
/// already includes this cycle's score).
pub fn finish(
    key: &str,
    label: &str,
    built: Built,
    history: Option<&FieldHistory>,
    lookback_ms: i64,
) -> CompositeIndex {
    let change = history
        .map(|h| windowed_change(h, lookback_ms))
        .unwrap_or_default();
    CompositeIndex {
        key: key.to_string(),
        label: label.to_string(),
        baseline: baseline(history, &built.series),
        score: built.score,
        series: built.series,
        change_pct: change.pct,
        change_mode: change.mode,
        spike_count: built.spike_count,
        contributors: built.contributors,
        last_observed_at: history.and_then(|h| h.last()).map(|p| p.ts),
        stale: false,
    }
}
