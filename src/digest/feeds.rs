// src/digest/feeds.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tracing::{debug, warn};

use super::types::{Article, FeedStatus};
use crate::error::DigestError;

pub const FEED_TIMEOUT: Duration = Duration::from_secs(12);
pub const MAX_ARTICLES: usize = 80;
pub const SUMMARY_INPUT_ARTICLES: usize = 40;
pub const BOT_USER_AGENT: &str = "Mozilla/5.0 (compatible; DossierNewsBot/1.0)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub source: String,
    pub url: String,
}

impl Feed {
    pub fn new(source: &str, url: &str) -> Self {
        Self {
            source: source.to_string(),
            url: url.to_string(),
        }
    }
}

/// Reuters answers from some networks only; its failures are recorded per
/// feed like any other.
pub fn default_feeds() -> Vec<Feed> {
    vec![
        Feed::new("BBC World", "https://feeds.bbci.co.uk/news/world/rss.xml"),
        Feed::new("BBC Business", "https://feeds.bbci.co.uk/news/business/rss.xml"),
        Feed::new("WSJ World", "https://feeds.a.dj.com/rss/RSSWorldNews.xml"),
        Feed::new("WSJ Markets", "https://feeds.a.dj.com/rss/RSSMarketsMain.xml"),
        Feed::new("ABC International", "https://abcnews.go.com/abcnews/internationalheadlines"),
        Feed::new("ABC Money", "https://abcnews.go.com/abcnews/moneyheadlines"),
        Feed::new("NY Post World", "https://nypost.com/world-news/feed/"),
        Feed::new("NY Post Business", "https://nypost.com/business/feed/"),
        Feed::new("The Economist International", "https://www.economist.com/international/rss.xml"),
        Feed::new(
            "The Economist Finance",
            "https://www.economist.com/finance-and-economics/rss.xml",
        ),
        Feed::new("Reuters Business", "https://feeds.reuters.com/reuters/businessNews"),
        Feed::new("Reuters World", "https://feeds.reuters.com/Reuters/worldNews"),
    ]
}

/// Articles plus what happened to each feed.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    pub articles: Vec<Article>,
    pub feed_status: Vec<FeedStatus>,
}

#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn collect(&self) -> Result<Collected, DigestError>;
}

/// Fixed article list, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticArticles {
    pub articles: Vec<Article>,
}

#[async_trait]
impl ArticleSource for StaticArticles {
    async fn collect(&self) -> Result<Collected, DigestError> {
        Ok(Collected {
            articles: self.articles.clone(),
            feed_status: vec![FeedStatus {
                source: "static".into(),
                ok: true,
                count: Some(self.articles.len()),
                error: None,
            }],
        })
    }
}

pub struct RssArticleSource {
    feeds: Vec<Feed>,
    http: reqwest::Client,
}

impl RssArticleSource {
    pub fn new(feeds: Vec<Feed>) -> Result<Self, DigestError> {
        let http = reqwest::Client::builder()
            .user_agent(BOT_USER_AGENT)
            .timeout(FEED_TIMEOUT)
            .build()
            .map_err(|e| DigestError::Unavailable(e.to_string()))?;
        Ok(Self { feeds, http })
    }
}

async fn fetch_feed(http: reqwest::Client, feed: Feed) -> Result<Vec<Article>, String> {
    let resp = http
        .get(&feed.url)
        .header("accept", "application/rss+xml, application/xml, text/xml")
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status().as_u16()));
    }
    let body = resp.text().await.map_err(|e| e.to_string())?;
    parse_feed(&feed.source, &body)
}

#[async_trait]
impl ArticleSource for RssArticleSource {
    async fn collect(&self) -> Result<Collected, DigestError> {
        let handles: Vec<_> = self
            .feeds
            .iter()
            .cloned()
            .map(|feed| {
                let http = self.http.clone();
                let source = feed.source.clone();
                (source, tokio::spawn(fetch_feed(http, feed)))
            })
            .collect();

        let mut articles = Vec::new();
        let mut feed_status = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let res = match handle.await {
                Ok(r) => r,
                Err(e) => Err(format!("task failed: {e}")),
            };
            match res {
                Ok(items) => {
                    debug!(target: "digest", feed = %source, count = items.len(), "feed ok");
                    feed_status.push(FeedStatus {
                        source,
                        ok: true,
                        count: Some(items.len()),
                        error: None,
                    });
                    articles.extend(items);
                }
                Err(error) => {
                    warn!(target: "digest", feed = %source, %error, "feed failed");
                    counter!("digest_feed_errors_total").increment(1);
                    feed_status.push(FeedStatus {
                        source,
                        ok: false,
                        count: None,
                        error: Some(error),
                    });
                }
            }
        }
        Ok(Collected {
            articles: newest_first(articles),
            feed_status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Decodes entities, drops inline markup, collapses whitespace.
pub fn clean_title(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let stripped = TAGS.replace_all(&decoded, " ");
    WS.replace_all(stripped.trim(), " ").into_owned()
}

pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(raw.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), 0)
}

fn scrub_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Items without a title or link are dropped.
pub fn parse_feed(source: &str, xml: &str) -> Result<Vec<Article>, String> {
    let rss: Rss = from_str(&scrub_entities_for_xml(xml)).map_err(|e| format!("parse: {e}"))?;
    Ok(rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            let title = clean_title(it.title.as_deref()?);
            let link = it.link?.trim().to_string();
            if title.is_empty() || link.is_empty() {
                return None;
            }
            Some(Article {
                source: source.to_string(),
                title,
                link,
                published_at: it.pub_date.as_deref().and_then(parse_pub_date),
            })
        })
        .collect())
}

/// Sorts newest first (undated last) and caps the list.
pub fn newest_first(mut articles: Vec<Article>) -> Vec<Article> {
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles.truncate(MAX_ARTICLES);
    articles
}

/// One numbered line per article for the summarizer prompt.
pub fn digest_input(articles: &[Article]) -> String {
    articles
        .iter()
        .take(SUMMARY_INPUT_ARTICLES)
        .enumerate()
        .map(|(i, a)| {
            let when = a
                .published_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown_time".to_string());
            format!("{}. [{}] {} ({})", i + 1, a.source, a.title, when)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
