//! Staleness / market-closed classification.
//!
//! Thresholds follow each market's normal update cadence.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Crypto,
    Commodity,
    Equity,
    OfficialRate,
    P2pRate,
    Index,
}

impl FieldKind {
    pub fn default_max_age_minutes(self) -> u32 {
        match self {
            FieldKind::Crypto => 90,
            FieldKind::Commodity | FieldKind::Equity => 240,
            FieldKind::OfficialRate => 720,
            FieldKind::P2pRate | FieldKind::Index => 180,
        }
    }
}

/// Stale when the last observation is older than `max_age_minutes`.
/// Unknown age (`None`) is never stale.
pub fn is_stale(last_observed_at: Option<i64>, max_age_minutes: u32, now_ms: i64) -> bool {
    match last_observed_at {
        Some(ts) => now_ms.saturating_sub(ts) > i64::from(max_age_minutes) * 60_000,
        None => false,
    }
}
