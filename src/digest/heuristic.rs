// src/digest/heuristic.rs
//! Headline-only brief used whenever the summarizer cannot run.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{Article, Brief, Confidence, FallbackReason, NO_CREDENTIALS_SUMMARY};

static MACRO_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(market|inflation|oil|econom|trade|rates|bank|fiscal|gdp|tariff|stocks)")
        .expect("macro keyword regex")
});

static GEO_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(war|military|sanction|diplom|election|border|security|geopolit|iran|china|russia|ukraine)",
    )
    .expect("geo keyword regex")
});

const TOP_ARTICLES: usize = 18;
const PER_CLASS: usize = 5;

fn line(a: &Article) -> String {
    format!("{}: {}", a.source, a.title)
}

pub fn is_macro(title: &str) -> bool {
    MACRO_KEYWORDS.is_match(title)
}

pub fn is_geo(title: &str) -> bool {
    GEO_KEYWORDS.is_match(title)
}

fn summary_for(reason: FallbackReason) -> &'static str {
    match reason {
        FallbackReason::NoCredentials => NO_CREDENTIALS_SUMMARY,
        FallbackReason::QuotaExceeded => {
            "AI summary unavailable: API quota exceeded. Showing an automatic headline summary."
        }
        FallbackReason::AiError => {
            "AI summary temporarily unavailable. Showing an automatic headline summary."
        }
    }
}

/// Keyword-classified brief over the newest headlines, tagged low confidence.
pub fn fallback_brief(articles: &[Article], reason: FallbackReason) -> Brief {
    let top = &articles[..articles.len().min(TOP_ARTICLES)];
    let slice = |from: usize, to: usize| -> Vec<String> {
        top.iter().skip(from).take(to.saturating_sub(from)).map(line).collect()
    };

    let mut macro_points: Vec<String> = top
        .iter()
        .filter(|a| is_macro(&a.title))
        .take(PER_CLASS)
        .map(line)
        .collect();
    if macro_points.is_empty() {
        macro_points = slice(0, 4);
    }

    let mut geo: Vec<String> = top
        .iter()
        .filter(|a| is_geo(&a.title))
        .take(PER_CLASS)
        .map(line)
        .collect();
    if geo.is_empty() {
        geo = slice(4, 8);
    }

    Brief {
        summary: summary_for(reason).to_string(),
        macro_points,
        geo,
        risks: vec![
            "Re-run the model summary once API access is available.".to_string(),
            "Verify the highest-impact headlines manually before acting.".to_string(),
        ],
        watchlist: slice(0, 4),
        confidence: Confidence::Low,
    }
}
