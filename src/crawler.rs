//! Website crawling.
//!
//! A [`Crawler`] turns a URL into a [`CrawlOutcome`]. The knowledge base runs
//! it on a background task after inserting the `pending` record, so the
//! crawler may take as long as it needs. [`SimulatedCrawler`] waits a fixed
//! delay and reports fixed page and byte counts.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use helpdesk_kb_core::models::CrawlOutcome;
use helpdesk_kb_core::{KbError, KbResult};
use url::Url;

use crate::config::CrawlConfig;

#[async_trait]
pub trait Crawler: Send + Sync {
    /// Fetch and index `url`. An error marks the website as `failed` with
    /// the error message as the reason.
    async fn crawl(&self, url: &Url) -> Result<CrawlOutcome>;
}

/// Crawler that sleeps for a fixed delay and returns fixed counts.
///
/// Hosts listed in `fail_hosts` always fail, which makes the `failed`
/// status reachable in tests and demos.
#[derive(Debug, Clone)]
pub struct SimulatedCrawler {
    delay: Duration,
    outcome: CrawlOutcome,
    fail_hosts: Vec<String>,
}

impl SimulatedCrawler {
    pub fn new(delay: Duration, outcome: CrawlOutcome) -> Self {
        Self {
            delay,
            outcome,
            fail_hosts: Vec::new(),
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(
            config.delay(),
            CrawlOutcome {
                pages_count: config.pages_count,
                size_bytes: config.size_bytes,
            },
        )
        .with_fail_hosts(config.fail_hosts.clone())
    }

    pub fn with_fail_hosts(mut self, hosts: Vec<String>) -> Self {
        self.fail_hosts = hosts
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();
        self
    }
}

#[async_trait]
impl Crawler for SimulatedCrawler {
    async fn crawl(&self, url: &Url) -> Result<CrawlOutcome> {
        tokio::time::sleep(self.delay).await;

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.fail_hosts.iter().any(|h| *h == host) {
            bail!("crawl of {} failed: host unreachable", host);
        }
        Ok(self.outcome)
    }
}

/// Parse a website URL, accepting only absolute `http`/`https` URLs with a
/// host.
pub fn parse_website_url(raw: &str) -> KbResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(KbError::invalid("url must not be empty"));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| KbError::invalid(format!("invalid url '{}': {}", trimmed, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(KbError::invalid(format!(
                "unsupported url scheme '{}': expected http or https",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(KbError::invalid(format!("url '{}' has no host", trimmed)));
    }
    Ok(url)
}
