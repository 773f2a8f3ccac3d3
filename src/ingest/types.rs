// src/ingest/types.rs
use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::FetchError;

/// One upstream feed as configured. `url == None` means disabled at load
/// time; `disabled_reason` then says why. A `body` turns the GET into a
/// JSON POST.
#[derive(Debug, Clone, PartialEq)]
pub struct Upstream {
    pub name: String,
    pub url: Option<String>,
    pub body: Option<Value>,
    pub disabled_reason: Option<String>,
}

impl Upstream {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            body: None,
            disabled_reason: None,
        }
    }

    pub fn disabled(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            body: None,
            disabled_reason: Some(reason.into()),
        }
    }
}

/// Source of raw upstream payloads. The HTTP implementation lives in
/// `ingest::http`; tests plug in canned or slow fetchers.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, upstream: &Upstream) -> Result<Value, FetchError>;
    fn name(&self) -> &'static str;
}

/// Everything one fan-out produced, keyed by upstream name.
#[derive(Debug, Clone, Default)]
pub struct UpstreamBatch {
    results: BTreeMap<String, Result<Value, FetchError>>,
}

impl UpstreamBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, result: Result<Value, FetchError>) {
        self.results.insert(name.into(), result);
    }

    /// Builder used heavily by tests.
    pub fn with(mut self, name: &str, payload: Value) -> Self {
        self.insert(name, Ok(payload));
        self
    }

    pub fn with_error(mut self, name: &str, err: FetchError) -> Self {
        self.insert(name, Err(err));
        self
    }

    /// Payload of a successful upstream; failed or unknown upstreams are absent.
    pub fn payload(&self, name: &str) -> Option<&Value> {
        self.results.get(name).and_then(|r| r.as_ref().ok())
    }

    pub fn error(&self, name: &str) -> Option<&FetchError> {
        self.results.get(name).and_then(|r| r.as_ref().err())
    }

    pub fn ok_count(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub fn error_count(&self) -> usize {
        self.results.len() - self.ok_count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
