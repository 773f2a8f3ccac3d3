//! # Series Compactor
//! Trims raw observation sequences to a bounded, finite, most-recent window,
//! and pulls plain numeric series out of upstream JSON payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::numeric::{coerce, finite};

/// Display bound for sparklines.
pub const DISPLAY_LEN: usize = 48;
/// Bound used for internal computations (sub-series of composite indices).
pub const INTERNAL_LEN: usize = 500;

/// Drop non-finite entries, then keep only the last `max_len` values.
///
/// Idempotent: compacting an already compacted series is a no-op.
pub fn compact<I>(raw: I, max_len: usize) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut out: Vec<f64> = raw.into_iter().filter_map(finite).collect();
    if out.len() > max_len {
        out.drain(..out.len() - max_len);
    }
    out
}

/// Same as [`compact`] over raw JSON elements, coercing each one first.
pub fn compact_json(raw: &[Value], max_len: usize) -> Vec<f64> {
    compact(raw.iter().filter_map(coerce), max_len)
}

/// Percentage change between the last element and the element `steps_back`
/// positions earlier. The base index is clamped to 0 for short series.
pub fn change_from_series(series: &[f64], steps_back: usize) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    let last_idx = series.len() - 1;
    let base_idx = last_idx.saturating_sub(steps_back);
    let last = finite(series[last_idx])?;
    let base = finite(series[base_idx])?;
    if base == 0.0 {
        return None;
    }
    finite((last - base) / base * 100.0)
}

/// Whether [`change_from_series`] had to clamp its base index.
pub fn series_spans(series: &[f64], steps_back: usize) -> bool {
    series.len() > steps_back
}

/// Element ordering of an upstream array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Where a numeric series lives inside an upstream payload.
///
/// `pointer` addresses the array; `item` (optional) addresses the number
/// inside each element, e.g. `/1` for `[ts, price]` pairs or `/value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub pointer: String,
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub order: SeriesOrder,
}

impl SeriesSpec {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            item: None,
            order: SeriesOrder::OldestFirst,
        }
    }

    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = SeriesOrder::NewestFirst;
        self
    }

    /// Extract the series oldest-first with absents dropped.
    /// `None` when the pointer does not address an array.
    pub fn extract(&self, payload: &Value) -> Option<Vec<f64>> {
        let arr = payload.pointer(&self.pointer)?.as_array()?;
        let mut out: Vec<f64> = arr
            .iter()
            .filter_map(|el| match &self.item {
                Some(p) => el.pointer(p).and_then(coerce),
                None => coerce(el),
            })
            .collect();
        if self.order == SeriesOrder::NewestFirst {
            out.reverse();
        }
        Some(out)
    }
}

/// Arithmetic mean, absent for an empty slice.
pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    finite(xs.iter().sum::<f64>() / xs.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_keeps_most_recent_finite_values() {
        let raw = vec![1.0, f64::NAN, 2.0, f64::INFINITY, 3.0, 4.0];
        assert_eq!(compact(raw, 3), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn compact_is_idempotent() {
        let raw: Vec<f64> = (0..100).map(|i| i as f64 * 1.5).collect();
        let once = compact(raw, DISPLAY_LEN);
        let twice = compact(once.clone(), DISPLAY_LEN);
        assert_eq!(once.len(), DISPLAY_LEN);
        assert_eq!(once, twice);
    }

    #[test]
    fn compact_json_coerces_strings_and_drops_junk() {
        let raw = vec![json!("1.5"), json!(null), json!(2), json!("x")];
        assert_eq!(compact_json(&raw, 48), vec![1.5, 2.0]);
    }

    #[test]
    fn change_from_series_clamps_base_index() {
        let s = vec![100.0, 105.0, 110.0];
        assert_eq!(change_from_series(&s, 1), Some((110.0 - 105.0) / 105.0 * 100.0));
        // steps_back beyond length → base is the first element
        assert_eq!(change_from_series(&s, 24), Some(10.0));
        assert!(!series_spans(&s, 24));
    }

    #[test]
    fn change_from_series_absent_cases() {
        assert_eq!(change_from_series(&[5.0], 1), None);
        assert_eq!(change_from_series(&[0.0, 5.0], 1), None);
    }

    #[test]
    fn extract_pairs_and_newest_first() {
        let chart = json!({"prices": [[1, 10.0], [2, 11.0], [3, "12.5"]]});
        let spec = SeriesSpec::new("/prices").item("/1");
        assert_eq!(spec.extract(&chart), Some(vec![10.0, 11.0, 12.5]));

        let wti = json!({"data": [{"value": "70.1"}, {"value": "."}, {"value": "69.0"}]});
        let spec = SeriesSpec::new("/data").item("/value").newest_first();
        assert_eq!(spec.extract(&wti), Some(vec![69.0, 70.1]));

        assert_eq!(SeriesSpec::new("/missing").extract(&wti), None);
    }
}
