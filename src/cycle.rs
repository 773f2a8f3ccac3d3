// src/cycle.rs
//! One refresh cycle as a pure function: previous snapshot + this cycle's
//! upstream batch → next snapshot. No I/O; the scheduler owns fetching,
//! publishing and persistence.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::change::{series_change, windowed_change, Change, ChangeMode};
use crate::composite::{self, SubSeries};
use crate::config::{AppConfig, FieldSpec, IndexSpec, StampCfg};
use crate::digest::client::MirrorState;
use crate::history::HistorySet;
use crate::ingest::types::UpstreamBatch;
use crate::series::compact;
use crate::snapshot::{ResolvedField, Snapshot, SCHEMA_VERSION};
use crate::staleness::is_stale;

pub const TOTAL_FAILURE_MESSAGE: &str =
    "Live data could not be refreshed; showing the last known values.";

/// History gives a true window when it can; an upstream series that spans
/// the window beats a since-start history figure.
pub fn pick_change(history: Change, series: Change) -> Change {
    if history.mode == ChangeMode::Window {
        return history;
    }
    if series.mode == ChangeMode::Window {
        return series;
    }
    if history.pct.is_some() {
        return history;
    }
    series
}

struct FieldDraft<'a> {
    spec: &'a FieldSpec,
    value: Option<f64>,
    live: bool,
    source: Option<String>,
    provenance: Option<String>,
    upstream_series: Option<(String, Vec<f64>)>,
}

fn draft_field<'a>(spec: &'a FieldSpec, batch: &UpstreamBatch, prev: &Snapshot) -> FieldDraft<'a> {
    let previous = prev.value(&spec.key);
    let res = spec.candidates.resolve(batch, previous);
    let (source, provenance) = if res.live {
        (res.source, res.provenance)
    } else {
        // Retained value keeps the provenance it was resolved with.
        let old = prev.field(&spec.key);
        (
            old.and_then(|f| f.source.clone()),
            old.and_then(|f| f.provenance.clone()),
        )
    };
    FieldDraft {
        spec,
        value: res.value,
        live: res.live,
        source,
        provenance,
        upstream_series: spec.series.resolve(batch),
    }
}

fn finish_field(
    draft: FieldDraft<'_>,
    history: &HistorySet,
    prev: &Snapshot,
    cfg: &AppConfig,
    now_ms: i64,
) -> ResolvedField {
    let spec = draft.spec;
    let old = prev.field(&spec.key);
    let hist = history.get(&spec.key);

    let last_observed_at = if draft.live {
        Some(now_ms)
    } else {
        old.and_then(|f| f.last_observed_at)
            .or_else(|| hist.and_then(|h| h.last()).map(|p| p.ts))
    };

    let display_len = cfg.refresh.display_len;
    let (series_source, series) = match &draft.upstream_series {
        Some((name, raw)) => (Some(name.clone()), compact(raw.iter().copied(), display_len)),
        None => match hist.filter(|h| h.len() >= 2) {
            Some(h) => (Some("history".to_string()), compact(h.values(), display_len)),
            None => (
                old.and_then(|f| f.series_source.clone()),
                old.map(|f| f.series.clone()).unwrap_or_default(),
            ),
        },
    };

    let from_history = hist
        .map(|h| windowed_change(h, cfg.refresh.lookback_ms()))
        .unwrap_or_default();
    let from_series = draft
        .upstream_series
        .as_ref()
        .map(|(_, raw)| {
            let internal = compact(raw.iter().copied(), cfg.refresh.internal_len);
            series_change(&internal, spec.change_steps_back)
        })
        .unwrap_or_default();
    let mut change = pick_change(from_history, from_series);
    if !draft.live && change.mode == ChangeMode::Unavailable {
        if let Some(f) = old {
            change = Change {
                pct: f.change_pct,
                mode: f.change_mode,
            };
        }
    }

    ResolvedField {
        key: spec.key.clone(),
        label: spec.label.clone(),
        kind: spec.kind,
        unit: spec.unit.clone(),
        value: draft.value,
        last_observed_at,
        series,
        change_pct: change.pct,
        change_mode: change.mode,
        change_label: change.mode.label(cfg.refresh.lookback_ms()),
        stale: is_stale(last_observed_at, spec.max_age_minutes(), now_ms),
        live: draft.live,
        source: draft.source,
        provenance: draft.provenance,
        series_source,
    }
}

/// Sub-series of every entity in the index payload that has one.
pub fn index_subseries(spec: &IndexSpec, payload: &Value) -> Vec<SubSeries> {
    let Some(entities) = payload.pointer(&spec.entities).and_then(Value::as_array) else {
        return Vec::new();
    };
    entities
        .iter()
        .enumerate()
        .filter_map(|(i, entity)| {
            let values = spec.series.extract(entity)?;
            if values.is_empty() {
                return None;
            }
            let name = spec
                .name
                .as_deref()
                .and_then(|p| entity.pointer(p))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{i}"));
            Some(SubSeries { name, values })
        })
        .collect()
}

fn source_stamp(stamp: Option<&StampCfg>, batch: &UpstreamBatch) -> Option<String> {
    let stamp = stamp?;
    batch
        .payload(&stamp.upstream)?
        .pointer(&stamp.pointer)?
        .as_str()
        .map(str::to_string)
}

/// Build the next snapshot. `digest` is whatever the mirror holds right now.
pub fn run_cycle(
    cfg: &AppConfig,
    batch: &UpstreamBatch,
    prev: &Snapshot,
    digest: &MirrorState,
    now_ms: i64,
) -> Snapshot {
    // Resolve everything first, then one batched history update.
    let drafts: Vec<FieldDraft<'_>> = cfg
        .fields
        .iter()
        .map(|f| draft_field(f, batch, prev))
        .collect();

    let index_builds: Vec<(&IndexSpec, Option<composite::Built>)> = cfg
        .indices
        .iter()
        .map(|spec| {
            let subs = batch
                .payload(&spec.upstream)
                .map(|p| index_subseries(spec, p))
                .unwrap_or_default();
            let built = (!subs.is_empty()).then(|| composite::build(&subs, spec.spike_ratio));
            (spec, built)
        })
        .collect();

    let mut history = prev.history.clone();
    let index_keys: Vec<String> = index_builds.iter().map(|(s, _)| s.history_key()).collect();
    let updates = drafts
        .iter()
        .map(|d| (d.spec.key.as_str(), d.value.filter(|_| d.live)))
        .chain(
            index_builds
                .iter()
                .zip(&index_keys)
                .map(|((_, built), key)| (key.as_str(), built.as_ref().and_then(|b| b.score))),
        );
    history.append_batch(updates, now_ms);

    let fields: BTreeMap<String, ResolvedField> = drafts
        .into_iter()
        .map(|d| {
            let f = finish_field(d, &history, prev, cfg, now_ms);
            (f.key.clone(), f)
        })
        .collect();

    let mut indices = BTreeMap::new();
    for ((spec, built), key) in index_builds.into_iter().zip(&index_keys) {
        let hist = history.get(key);
        let mut ix = match built {
            Some(b) => {
                composite::finish(&spec.key, &spec.label, b, hist, cfg.refresh.lookback_ms())
            }
            None => match prev.indices.get(&spec.key) {
                Some(old) => old.clone(),
                None => continue,
            },
        };
        ix.stale = is_stale(ix.last_observed_at, spec.max_age_minutes(), now_ms);
        indices.insert(spec.key.clone(), ix);
    }

    let live = fields.values().filter(|f| f.live).count();
    let error = if !fields.is_empty() && live == 0 {
        Some(TOTAL_FAILURE_MESSAGE.to_string())
    } else {
        digest.notice.clone()
    };
    debug!(target: "refresh", live, total = fields.len(), indices = indices.len(), "cycle resolved");

    Snapshot {
        schema_version: SCHEMA_VERSION,
        generated_at: Some(now_ms),
        cycle: prev.cycle + 1,
        fields,
        history,
        indices,
        digest: digest.clone(),
        source_updated_at: source_stamp(cfg.source_stamp.as_ref(), batch)
            .or_else(|| prev.source_updated_at.clone()),
        error,
    }
}
