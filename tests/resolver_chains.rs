// tests/resolver_chains.rs
//
// Candidate chains as loaded from the default config, evaluated against
// recorded upstream payloads.

mod common;

use common::{assert_close, config, full_batch};
use dossier::config::FieldSpec;
use dossier::error::FetchError;
use dossier::ingest::types::UpstreamBatch;
use dossier::resolve::{Candidate, CandidateChain, Provider};
use dossier::series::SeriesSpec;
use serde_json::json;

fn field(key: &str) -> FieldSpec {
    config()
        .fields
        .into_iter()
        .find(|f| f.key == key)
        .unwrap_or_else(|| panic!("field {key} missing from default config"))
}

fn without(batch: UpstreamBatch, names: &[&str]) -> UpstreamBatch {
    names.iter().fold(batch, |b, n| {
        b.with_error(n, FetchError::Timeout {
            upstream: n.to_string(),
            ms: 10_000,
        })
    })
}

#[test]
fn first_finite_candidate_wins_in_order() {
    let batch = UpstreamBatch::new().with("chart", json!({ "prices": [[0, 41.0], [1, 42.0]] }));
    let chain = CandidateChain::new(vec![
        Candidate::direct("direct", None),
        Candidate::series_last("chart_last", "chart", SeriesSpec::new("/prices").item("/1")),
        Candidate::previous(),
    ]);
    let r = chain.resolve(&batch, Some(10.0));
    assert_eq!(r.value, Some(42.0));
    assert_eq!(r.source.as_deref(), Some("chart_last"));
    assert!(r.live);
}

#[test]
fn chain_order_matters() {
    let batch = UpstreamBatch::new().with("q", json!({ "v": "7.5" }));
    let a = CandidateChain::new(vec![
        Candidate::direct("manual", Some(1.0)),
        Candidate::pointer("quote", "q", "/v"),
    ]);
    let mut b = a.clone();
    b.candidates.reverse();
    assert_eq!(a.resolve(&batch, None).value, Some(1.0));
    assert_eq!(b.resolve(&batch, None).value, Some(7.5));
    assert_eq!(b.names(), vec!["quote", "manual"]);
}

#[test]
fn btc_walks_quote_then_charts_then_previous() {
    let btc = field("btc");
    let chain = &btc.candidates;
    assert_eq!(
        chain.names(),
        vec!["coingecko_quote", "coingecko_chart", "binance_chart", "previous"]
    );

    let r = chain.resolve(&full_batch(), Some(1.0));
    assert_eq!(r.value, Some(63250.5));
    assert_eq!(r.provenance.as_deref(), Some("CoinGecko spot quote"));

    let r = chain.resolve(&without(full_batch(), &["coingecko_simple"]), Some(1.0));
    assert_eq!(r.value, Some(62900.0));
    assert_eq!(r.source.as_deref(), Some("coingecko_chart"));

    let r = chain.resolve(
        &without(full_batch(), &["coingecko_simple", "coingecko_chart"]),
        Some(1.0),
    );
    assert_eq!(r.value, Some(61040.0));
    assert_eq!(r.source.as_deref(), Some("binance_chart"));

    let r = chain.resolve(
        &without(full_batch(), &["coingecko_simple", "coingecko_chart", "binance_klines"]),
        Some(60123.0),
    );
    assert_eq!(r.value, Some(60123.0));
    assert_eq!(r.source.as_deref(), Some("previous"));
    assert!(!r.live);
}

#[test]
fn exhausted_chain_without_previous_is_absent() {
    let r = field("spx").candidates.resolve(&full_batch(), None);
    assert_eq!(r.value, None);
    assert!(r.source.is_none());
    assert!(!r.live);
}

#[test]
fn quote_strings_are_coerced() {
    let r = field("gold").candidates.resolve(&full_batch(), None);
    assert_eq!(r.value, Some(241.3));
}

#[test]
fn newest_first_series_yields_latest_observation() {
    let r = field("wti").candidates.resolve(&full_batch(), None);
    assert_eq!(r.value, Some(62.39));
    let (name, series) = field("wti").series.resolve(&full_batch()).expect("wti series");
    assert_eq!(name, "alphavantage_wti");
    assert_eq!(series, vec![61.51, 59.0, 62.39]);
}

#[test]
fn parallel_rate_uses_two_sided_depth() {
    let r = field("usd_ves_parallel").candidates.resolve(&full_batch(), None);
    // buy: top 8 positive offers (the "0" offer is skipped); sell: all 8.
    assert_close(r.value.unwrap(), (301.7125 + 296.225) / 2.0);
    assert_eq!(r.source.as_deref(), Some("p2p_depth"));
    assert_eq!(
        r.provenance.as_deref(),
        Some("Binance P2P: mean of top 8 buy and sell offers")
    );
}

#[test]
fn one_sided_depth_falls_back_to_reference_rate() {
    let r = field("usd_ves_parallel")
        .candidates
        .resolve(&without(full_batch(), &["p2p_sell"]), None);
    assert_eq!(r.value, Some(290.1));
    assert_eq!(r.source.as_deref(), Some("dolarapi_paralelo"));
}

#[test]
fn chains_are_plain_data() {
    let mut chain = field("gold").candidates;
    chain
        .candidates
        .insert(0, Candidate::direct("override", Some(250.0)).labelled("manual override"));
    let r = chain.resolve(&full_batch(), None);
    assert_eq!(r.value, Some(250.0));
    assert_eq!(r.provenance.as_deref(), Some("manual override"));
    assert!(matches!(chain.candidates[1].provider, Provider::Pointer { .. }));
    assert_eq!(chain.upstreams(), vec!["av_gld"]);
}
