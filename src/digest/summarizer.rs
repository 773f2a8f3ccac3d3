// src/digest/summarizer.rs
//! Text generator seam behind the digest. `OpenAiSummarizer` calls the Chat
//! Completions endpoint in JSON mode; `MockSummarizer` is deterministic and
//! is selected by `AI_TEST_MODE=mock`; `DisabledSummarizer` always reports
//! missing credentials so the service degrades to the heuristic brief.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::feeds::digest_input;
use super::types::{AdHocBrief, Article, Brief, Confidence};
use crate::config::AiConfig;
use crate::error::SummarizeError;

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_POINTS: usize = 6;
const MAX_POINT_CHARS: usize = 280;

const DIGEST_PROMPT: &str = "You are a markets and geopolitics desk editor. From the numbered headlines, \
return a JSON object with keys: summary (2-3 sentences), macro (array of short strings), \
geo (array), risks (array), watchlist (array), confidence (low|medium|high). \
Use only the headlines provided. Output JSON only.";

const BRIEF_PROMPT: &str = "You write concise analyst briefs. Return a JSON object with keys: \
summary (2-3 sentences), key_points (array of short strings), risks (array), \
confidence (low|medium|high). Output JSON only.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, articles: &[Article]) -> Result<Brief, SummarizeError>;
    async fn brief_text(&self, text: &str, scope: &str) -> Result<AdHocBrief, SummarizeError>;
    fn credentialed(&self) -> bool;
    fn provider_name(&self) -> &'static str;
}

/// Picks the implementation from env-driven config.
pub fn build_summarizer(cfg: &AiConfig) -> Result<Arc<dyn Summarizer>, SummarizeError> {
    if cfg.mock {
        return Ok(Arc::new(MockSummarizer::default()));
    }
    if !cfg.has_credentials() {
        return Ok(Arc::new(DisabledSummarizer));
    }
    Ok(Arc::new(OpenAiSummarizer::new(
        cfg.api_key.clone(),
        cfg.model.clone(),
    )?))
}

/// Trims, drops empties and bounds list length and item size.
pub fn sanitize_points(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().chars().take(MAX_POINT_CHARS).collect::<String>())
        .filter(|s| !s.is_empty())
        .take(MAX_POINTS)
        .collect()
}

fn parse_confidence(raw: Option<&str>) -> Confidence {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("high") => Confidence::High,
        Some("medium") => Confidence::Medium,
        _ => Confidence::Low,
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawBrief {
    #[serde(default)]
    summary: String,
    #[serde(rename = "macro", default)]
    macro_points: Vec<String>,
    #[serde(default)]
    geo: Vec<String>,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    watchlist: Vec<String>,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    confidence: Option<String>,
}

fn parse_raw(content: &str) -> Result<RawBrief, SummarizeError> {
    let raw: RawBrief = serde_json::from_str(content.trim())
        .map_err(|e| SummarizeError::Failed(format!("model returned invalid json: {e}")))?;
    if raw.summary.trim().is_empty() {
        return Err(SummarizeError::Failed("model returned an empty summary".into()));
    }
    Ok(raw)
}

/// Parses a model reply into a digest brief.
pub fn parse_brief(content: &str) -> Result<Brief, SummarizeError> {
    let raw = parse_raw(content)?;
    Ok(Brief {
        summary: raw.summary.trim().to_string(),
        macro_points: sanitize_points(raw.macro_points),
        geo: sanitize_points(raw.geo),
        risks: sanitize_points(raw.risks),
        watchlist: sanitize_points(raw.watchlist),
        confidence: parse_confidence(raw.confidence.as_deref()),
    })
}

pub fn parse_ad_hoc(content: &str) -> Result<AdHocBrief, SummarizeError> {
    let raw = parse_raw(content)?;
    Ok(AdHocBrief {
        summary: raw.summary.trim().to_string(),
        key_points: sanitize_points(raw.key_points),
        risks: sanitize_points(raw.risks),
        confidence: parse_confidence(raw.confidence.as_deref()),
    })
}

pub struct OpenAiSummarizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(api_key: String, model: String) -> Result<Self, SummarizeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SummarizeError::Failed(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model,
        })
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, SummarizeError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: Value,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        if self.api_key.is_empty() {
            return Err(SummarizeError::NoCredentials);
        }
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.2,
            response_format: serde_json::json!({ "type": "json_object" }),
        };

        let resp = self
            .http
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| SummarizeError::Failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| SummarizeError::Failed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SummarizeError::Failed("empty completion".into()))
    }
}

/// 429 and quota error codes count as quota exhaustion.
pub fn classify_failure(status: u16, body: &str) -> SummarizeError {
    if status == 429 || body.contains("insufficient_quota") {
        SummarizeError::QuotaExceeded
    } else {
        SummarizeError::Failed(format!("HTTP {status}"))
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, articles: &[Article]) -> Result<Brief, SummarizeError> {
        let content = self.complete(DIGEST_PROMPT, &digest_input(articles)).await?;
        parse_brief(&content)
    }

    async fn brief_text(&self, text: &str, scope: &str) -> Result<AdHocBrief, SummarizeError> {
        let user = format!("Scope: {scope}\n\n{text}");
        let content = self.complete(BRIEF_PROMPT, &user).await?;
        parse_ad_hoc(&content)
    }

    fn credentialed(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _articles: &[Article]) -> Result<Brief, SummarizeError> {
        Err(SummarizeError::NoCredentials)
    }

    async fn brief_text(&self, _text: &str, _scope: &str) -> Result<AdHocBrief, SummarizeError> {
        Err(SummarizeError::NoCredentials)
    }

    fn credentialed(&self) -> bool {
        false
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic summarizer: echoes the first headlines back.
#[derive(Debug, Clone, Default)]
pub struct MockSummarizer {
    pub fail_with: Option<SummarizeError>,
}

impl MockSummarizer {
    pub fn failing(err: SummarizeError) -> Self {
        Self {
            fail_with: Some(err),
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, articles: &[Article]) -> Result<Brief, SummarizeError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        let heads: Vec<String> = articles.iter().take(3).map(|a| a.title.clone()).collect();
        Ok(Brief {
            summary: format!("Mock digest of {} articles.", articles.len()),
            macro_points: heads.clone(),
            geo: Vec::new(),
            risks: vec!["mock risk".to_string()],
            watchlist: heads,
            confidence: Confidence::Medium,
        })
    }

    async fn brief_text(&self, text: &str, scope: &str) -> Result<AdHocBrief, SummarizeError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok(AdHocBrief {
            summary: format!("Mock {scope} brief ({} chars).", text.chars().count()),
            key_points: vec![text.chars().take(60).collect()],
            risks: Vec::new(),
            confidence: Confidence::Medium,
        })
    }

    fn credentialed(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
