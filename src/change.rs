//! # Windowed Change
//! Percentage change over a lookback, computed from a field's history.
//!
//! A history that does not yet span the lookback still reports a change, but
//! measured from its earliest point and labelled [`ChangeMode::SinceStart`].
//! Consumers must surface the mode next to the number.

use serde::{Deserialize, Serialize};

use crate::history::FieldHistory;
use crate::numeric::finite;
use crate::series::{change_from_series, series_spans};

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeMode {
    /// Base point sits at or before `last.ts - lookback`.
    Window,
    /// Window not spanned yet; base is the earliest point.
    SinceStart,
    #[default]
    Unavailable,
}

impl ChangeMode {
    /// Short human label for the dashboard.
    pub fn label(self, lookback_ms: i64) -> String {
        match self {
            ChangeMode::Window => format!("{}h", lookback_ms / 3_600_000),
            ChangeMode::SinceStart => "since tracking began".to_string(),
            ChangeMode::Unavailable => "n/a".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub pct: Option<f64>,
    pub mode: ChangeMode,
}

impl Change {
    pub const UNAVAILABLE: Change = Change {
        pct: None,
        mode: ChangeMode::Unavailable,
    };
}

/// Change between the newest point and the newest point at or before
/// `newest.ts - lookback_ms`.
pub fn windowed_change(history: &FieldHistory, lookback_ms: i64) -> Change {
    let points = history.points();
    if points.len() < 2 {
        return Change::UNAVAILABLE;
    }
    let last = points[points.len() - 1];
    let target = last.ts.saturating_sub(lookback_ms);

    let (base, mode) = match points.iter().rev().find(|p| p.ts <= target) {
        Some(p) => (*p, ChangeMode::Window),
        None => (points[0], ChangeMode::SinceStart),
    };

    if base.value == 0.0 {
        return Change::UNAVAILABLE;
    }
    match finite((last.value - base.value) / base.value * 100.0) {
        Some(pct) => Change {
            pct: Some(pct),
            mode,
        },
        None => Change::UNAVAILABLE,
    }
}

/// Change from a plain upstream series, for fields without a usable history
/// yet. A clamped base index is reported as `SinceStart`.
pub fn series_change(series: &[f64], steps_back: usize) -> Change {
    match change_from_series(series, steps_back) {
        Some(pct) => Change {
            pct: Some(pct),
            mode: if series_spans(series, steps_back) {
                ChangeMode::Window
            } else {
                ChangeMode::SinceStart
            },
        },
        None => Change::UNAVAILABLE,
    }
}
