// tests/refresh_cycle.rs
//
// Whole refresh cycles over recorded payloads: resolution, history, change,
// staleness, retention on failure and the single user-visible error line.

mod common;

use common::{assert_close, config, dead_batch, full_batch, HOUR, MINUTE, T0};
use dossier::change::ChangeMode;
use dossier::config::StampCfg;
use dossier::cycle::{run_cycle, TOTAL_FAILURE_MESSAGE};
use dossier::digest::client::MirrorState;
use dossier::snapshot::Snapshot;

fn first_cycle() -> Snapshot {
    run_cycle(&config(), &full_batch(), &Snapshot::empty(), &MirrorState::default(), T0)
}

#[test]
fn cold_start_cycle_resolves_live_fields() {
    let s = first_cycle();
    assert_eq!(s.cycle, 1);
    assert_eq!(s.generated_at, Some(T0));
    assert!(s.error.is_none());

    let btc = s.field("btc").expect("btc");
    assert_eq!(btc.value, Some(63250.5));
    assert!(btc.live);
    assert_eq!(btc.last_observed_at, Some(T0));
    assert_eq!(btc.series.len(), 30);
    assert_eq!(btc.series_source.as_deref(), Some("coingecko_chart"));
    // One history point only: the hourly chart supplies the 24h change.
    assert_eq!(btc.change_mode, ChangeMode::Window);
    assert_eq!(btc.change_label, "24h");
    assert_close(btc.change_pct.unwrap(), (62900.0 - 60500.0) / 60500.0 * 100.0);

    assert_eq!(s.value("gold"), Some(241.3));
    assert_eq!(s.value("usd_ves_official"), Some(189.45));
    assert_eq!(s.value("wti"), Some(62.39));
    assert_eq!(s.source_updated_at.as_deref(), Some("2025-10-14T20:00:00.000Z"));
}

#[test]
fn unavailable_upstreams_leave_fields_absent_at_first_run() {
    let s = first_cycle();
    for key in ["silver", "spx"] {
        let f = s.field(key).expect(key);
        assert_eq!(f.value, None, "{key}");
        assert!(!f.live);
        assert!(!f.stale, "unknown age is never stale");
        assert_eq!(f.change_mode, ChangeMode::Unavailable);
    }
    assert!(s.history.get("silver").is_none());
}

#[test]
fn index_is_built_and_tracked_in_history() {
    let s = first_cycle();
    let ix = s.indices.get("attention").expect("attention index");
    assert_eq!(ix.score, Some(26.0));
    assert_eq!(ix.spike_count, 1);
    assert_eq!(ix.baseline, Some(26.0));
    assert_eq!(ix.last_observed_at, Some(T0));
    assert_eq!(s.history.last_value("index:attention"), Some(26.0));
}

#[test]
fn total_failure_keeps_last_values_and_reports_once() {
    let cfg = config();
    let first = first_cycle();
    let second = run_cycle(&cfg, &dead_batch(&cfg), &first, &MirrorState::default(), T0 + 10 * MINUTE);

    assert_eq!(second.error.as_deref(), Some(TOTAL_FAILURE_MESSAGE));
    let btc = second.field("btc").unwrap();
    assert_eq!(btc.value, Some(63250.5), "never reverts to absent once populated");
    assert!(!btc.live);
    assert_eq!(btc.last_observed_at, Some(T0));
    assert_eq!(btc.provenance.as_deref(), Some("CoinGecko spot quote"));
    assert_eq!(btc.series, first.field("btc").unwrap().series);
    assert_eq!(btc.change_mode, ChangeMode::Window);
    assert!(!btc.stale);

    assert_eq!(second.history.get("btc").unwrap().len(), 1, "retained values are not re-recorded");
    assert_eq!(second.indices.get("attention"), first.indices.get("attention"));
    assert_eq!(second.source_updated_at, first.source_updated_at);
}

#[test]
fn retained_values_age_into_staleness_per_field() {
    let cfg = config();
    let dead = dead_batch(&cfg);
    let mut s = first_cycle();
    s = run_cycle(&cfg, &dead, &s, &MirrorState::default(), T0 + 91 * MINUTE);
    assert!(s.field("btc").unwrap().stale, "crypto threshold is 90 min");
    assert!(!s.field("gold").unwrap().stale, "commodity threshold is 240 min");
    assert!(!s.field("usd_ves_parallel").unwrap().stale);
    assert!(!s.indices.get("attention").unwrap().stale);

    s = run_cycle(&cfg, &dead, &s, &MirrorState::default(), T0 + 4 * HOUR + MINUTE);
    assert!(s.field("gold").unwrap().stale);
    assert!(s.field("usd_ves_parallel").unwrap().stale, "p2p threshold is 180 min");
    assert!(!s.field("usd_ves_official").unwrap().stale, "official threshold is 720 min");
    assert!(s.indices.get("attention").unwrap().stale);
}

#[test]
fn history_takes_over_once_the_window_is_spanned() {
    let cfg = config();
    let first = first_cycle();
    let next = run_cycle(&cfg, &full_batch(), &first, &MirrorState::default(), T0 + 25 * HOUR);
    let gold = next.field("gold").unwrap();
    assert_eq!(gold.change_mode, ChangeMode::Window);
    assert_eq!(gold.change_pct, Some(0.0));
    assert_eq!(gold.series, vec![241.3, 241.3]);
    assert_eq!(gold.series_source.as_deref(), Some("history"));
    assert_eq!(next.history.get("gold").unwrap().len(), 2);
    assert_eq!(next.cycle, 2);
}

#[test]
fn digest_rate_limit_notice_is_the_visible_error() {
    let digest = MirrorState {
        digest: None,
        notice: Some("digest limited".into()),
    };
    let s = run_cycle(&config(), &full_batch(), &Snapshot::empty(), &digest, T0);
    assert_eq!(s.error.as_deref(), Some("digest limited"));
    assert_eq!(s.digest, digest);

    let cfg = config();
    let dead = run_cycle(&cfg, &dead_batch(&cfg), &s, &digest, T0 + MINUTE);
    assert_eq!(dead.error.as_deref(), Some(TOTAL_FAILURE_MESSAGE));
}

#[test]
fn source_stamp_points_at_the_official_rate_upstream() {
    let cfg = config();
    let stamp: &StampCfg = cfg.source_stamp.as_ref().unwrap();
    assert_eq!(stamp.upstream, "dolarapi_oficial");
    assert_eq!(stamp.pointer, "/fechaActualizacion");
}
