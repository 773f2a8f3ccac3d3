// src/ingest/http.rs
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::types::{Fetcher, Upstream};

pub const USER_AGENT: &str = "dossier/0.1 (+market dashboard)";

/// Plain reqwest JSON fetcher. Timeouts are enforced by the fan-out, the
/// client only bounds connection setup.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, upstream: &Upstream) -> Result<Value, FetchError> {
        let Some(url) = upstream.url.as_deref() else {
            return Err(FetchError::Disabled(
                upstream
                    .disabled_reason
                    .clone()
                    .unwrap_or_else(|| "no url".to_string()),
            ));
        };
        let req = match &upstream.body {
            Some(body) => self.http.post(url).json(body),
            None => self.http.get(url),
        };
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
