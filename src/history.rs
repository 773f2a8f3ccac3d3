//! Bounded, time-ordered observations per tracked field.
//!
//! Every field keeps at most [`MAX_POINTS`] observations no older than
//! [`MAX_AGE_MS`] (measured at the last prune). Duplicate timestamps are
//! allowed; appends always go to the end.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::numeric::finite;

pub const MAX_POINTS: usize = 400;
pub const MAX_AGE_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// One resolved value at a point in time (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub ts: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldHistory {
    points: Vec<Observation>,
}

impl FieldHistory {
    /// Build from raw points (used by tests and snapshot restore paths).
    pub fn from_points(mut points: Vec<Observation>) -> Self {
        points.sort_by_key(|p| p.ts);
        Self { points }
    }

    pub fn points(&self) -> &[Observation] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value of the most recent point.
    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    pub fn last(&self) -> Option<&Observation> {
        self.points.last()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.value)
    }

    /// Drop everything older than `now_ts - MAX_AGE_MS`.
    pub fn prune(&mut self, now_ts: i64) {
        let cutoff = now_ts.saturating_sub(MAX_AGE_MS);
        // ascending order: old points sit at the front
        let keep_from = self.points.partition_point(|p| p.ts < cutoff);
        if keep_from > 0 {
            self.points.drain(..keep_from);
        }
    }

    /// Prune, append `value` at `now_ts` (if finite), then cap.
    pub fn append(&mut self, value: Option<f64>, now_ts: i64) {
        self.prune(now_ts);
        let Some(value) = value.and_then(finite) else {
            return;
        };
        self.points.push(Observation { ts: now_ts, value });
        if self.points.len() > MAX_POINTS {
            let excess = self.points.len() - MAX_POINTS;
            self.points.drain(0..excess);
        }
    }
}

/// Field key → history. Owned by the refresh cycle; readers only ever see
/// complete copies inside a published snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistorySet {
    fields: BTreeMap<String, FieldHistory>,
}

impl HistorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldHistory> {
        self.fields.get(key)
    }

    pub fn last_value(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FieldHistory::last_value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append one value. An absent value creates nothing but still prunes an
    /// existing history.
    pub fn append(&mut self, key: &str, value: Option<f64>, now_ts: i64) {
        match (self.fields.get_mut(key), value.and_then(finite)) {
            (Some(h), v) => h.append(v, now_ts),
            (None, Some(v)) => {
                let mut h = FieldHistory::default();
                h.append(Some(v), now_ts);
                self.fields.insert(key.to_string(), h);
            }
            (None, None) => {}
        }
    }

    /// One logical update for a whole refresh cycle: every key shares `now_ts`.
    pub fn append_batch<'a, I>(&mut self, updates: I, now_ts: i64)
    where
        I: IntoIterator<Item = (&'a str, Option<f64>)>,
    {
        for (key, value) in updates {
            self.append(key, value, now_ts);
        }
    }
}
