// src/config/ai.rs
use serde::{Deserialize, Serialize};

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_TEST_MODE: &str = "AI_TEST_MODE";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Summarizer settings. Credentials come from the environment only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiConfig {
    /// Empty means "no credentials": the digest degrades to headlines.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    /// `AI_TEST_MODE=mock` swaps in a deterministic summarizer.
    pub mock: bool,
}

impl AiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY)
            .map(|k| k.trim().to_string())
            .unwrap_or_default();
        let model = lookup(ENV_MODEL)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mock = lookup(ENV_TEST_MODE).is_some_and(|v| v == "mock");
        Self {
            api_key,
            model,
            mock,
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}
