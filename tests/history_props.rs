// tests/history_props.rs
//
// Bounded history and series compaction properties.

mod common;

use common::{HOUR, T0};
use dossier::history::{FieldHistory, HistorySet, MAX_AGE_MS, MAX_POINTS};
use dossier::series::{compact, compact_json, DISPLAY_LEN};
use serde_json::json;

/// Deterministic spread of cadences: dense bursts, hourly, daily, sparse.
const CADENCES_MS: [i64; 5] = [1_000, 60_000, HOUR, 24 * HOUR, 9 * 24 * HOUR];

#[test]
fn append_keeps_age_and_size_bounds() {
    for step in CADENCES_MS {
        for n in [1usize, 50, 399, 400, 401, 1_000] {
            let mut h = FieldHistory::default();
            let mut now = T0;
            for i in 0..n {
                now = T0 + i as i64 * step;
                h.append(Some(i as f64), now);
                assert!(h.len() <= MAX_POINTS, "len {} after {i} appends (step {step})", h.len());
                assert!(
                    h.points().iter().all(|p| p.ts >= now - MAX_AGE_MS),
                    "stale point kept (step {step}, n {n})"
                );
            }
            assert_eq!(h.last_value(), Some((n - 1) as f64));
            assert!(h.points().windows(2).all(|w| w[0].ts <= w[1].ts));
            assert_eq!(h.last().map(|p| p.ts), Some(now));
        }
    }
}

#[test]
fn oldest_points_go_first_when_capped() {
    let mut h = FieldHistory::default();
    for i in 0..(MAX_POINTS + 10) {
        h.append(Some(i as f64), T0 + i as i64 * 1_000);
    }
    assert_eq!(h.len(), MAX_POINTS);
    assert_eq!(h.points()[0].value, 10.0);
}

#[test]
fn absent_value_prunes_without_appending() {
    let mut set = HistorySet::new();
    set.append("btc", Some(1.0), T0);
    set.append("btc", Some(2.0), T0 + HOUR);
    set.append("btc", None, T0 + MAX_AGE_MS + HOUR / 2);
    let h = set.get("btc").expect("history kept");
    assert_eq!(h.len(), 1);
    assert_eq!(h.last_value(), Some(2.0));

    set.append("gold", None, T0);
    assert!(set.get("gold").is_none(), "absent value must not create a history");
}

#[test]
fn non_finite_values_are_not_recorded() {
    let mut set = HistorySet::new();
    set.append_batch([("a", Some(f64::NAN)), ("b", Some(f64::INFINITY)), ("c", Some(3.0))], T0);
    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["c"]);
}

#[test]
fn batch_update_shares_one_timestamp() {
    let mut set = HistorySet::new();
    set.append_batch([("a", Some(1.0)), ("b", Some(2.0)), ("c", None)], T0);
    assert_eq!(set.len(), 2);
    assert_eq!(set.get("a").unwrap().last().unwrap().ts, T0);
    assert_eq!(set.get("b").unwrap().last().unwrap().ts, T0);
}

#[test]
fn compact_is_idempotent() {
    let samples: Vec<Vec<f64>> = vec![
        vec![],
        vec![1.0],
        (0..47).map(f64::from).collect(),
        (0..48).map(f64::from).collect(),
        (0..500).map(|i| (i as f64).sin() * 100.0).collect(),
        vec![f64::NAN, 1.0, f64::INFINITY, 2.0, f64::NEG_INFINITY],
    ];
    for s in samples {
        let once = compact(s.iter().copied(), DISPLAY_LEN);
        let twice = compact(once.iter().copied(), DISPLAY_LEN);
        assert_eq!(once, twice);
        assert!(once.len() <= DISPLAY_LEN);
        assert!(once.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn compact_keeps_most_recent_coercible_values() {
    let raw = vec![json!(1), json!("2.5"), json!(null), json!("n/a"), json!(4), json!(true)];
    assert_eq!(compact_json(&raw, 2), vec![2.5, 4.0]);
    assert_eq!(compact_json(&raw, 48), vec![1.0, 2.5, 4.0]);
}
