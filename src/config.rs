use anyhow::{Context, Result};
use helpdesk_kb_core::store::{QuotaPolicy, DEFAULT_LIMIT_BYTES};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_limit_bytes")]
    pub limit_bytes: u64,
    #[serde(default)]
    pub quota: QuotaPolicy,
    /// Seed every newly created knowledge base with the demo records.
    #[serde(default)]
    pub seed_demo: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            limit_bytes: default_limit_bytes(),
            quota: QuotaPolicy::default(),
            seed_demo: false,
        }
    }
}

fn default_limit_bytes() -> u64 {
    DEFAULT_LIMIT_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_training_delay_ms")]
    pub delay_ms: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_training_delay_ms(),
        }
    }
}

impl TrainingConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_training_delay_ms() -> u64 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_crawl_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_pages_count")]
    pub pages_count: u32,
    #[serde(default = "default_crawl_size_bytes")]
    pub size_bytes: u64,
    /// Hosts whose crawls always fail. Used to exercise the `failed` state.
    #[serde(default)]
    pub fail_hosts: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_crawl_delay_ms(),
            pages_count: default_pages_count(),
            size_bytes: default_crawl_size_bytes(),
            fail_hosts: Vec::new(),
        }
    }
}

impl CrawlConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_crawl_delay_ms() -> u64 {
    2000
}
fn default_pages_count() -> u32 {
    5
}
fn default_crawl_size_bytes() -> u64 {
    15_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Configuration used when no file is available.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:7341".to_string(),
            },
            knowledge: KnowledgeConfig::default(),
            training: TrainingConfig::default(),
            crawl: CrawlConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.knowledge.limit_bytes == 0 {
        anyhow::bail!("knowledge.limit_bytes must be > 0");
    }

    if config.crawl.pages_count == 0 {
        anyhow::bail!("crawl.pages_count must be > 0");
    }

    for host in &config.crawl.fail_hosts {
        if host.trim().is_empty() || host.contains('/') {
            anyhow::bail!(
                "crawl.fail_hosts entries must be bare host names, got '{}'",
                host
            );
        }
    }

    if tracing_subscriber::EnvFilter::try_new(&config.logging.filter).is_err() {
        anyhow::bail!("logging.filter is not a valid filter: '{}'", config.logging.filter);
    }

    Ok(())
}
