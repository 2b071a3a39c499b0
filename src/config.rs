//! YAML configuration for an ingestion run.
//!
//! Every field has a default, so a config file only needs to list what it
//! changes. Command-line flags override file values (see `main.rs`).
//!
//! ```yaml
//! patterns:
//!   - nytimes.com/2020/*/*
//!   - bbc.co.uk/news/*
//! balance: even
//! batch_size: 10
//! concurrency: 4
//! requests_per_second: 5
//! resume:
//!   batch: 3
//!   index: CC-MAIN-2024-33
//!   pattern: bbc.co.uk/news/*
//! retry:
//!   max_retries: 20
//!   base_delay_ms: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::catalog::{Balance, COLLINFO_URL};
use crate::collaborators::classify::TopicKeywords;
use crate::error::{IngestError, Result};
use crate::fetcher::DEFAULT_ARCHIVE_BASE_URL;
use crate::http::RetryPolicy;
use crate::lookup::DEFAULT_BATCH_SIZE;
use crate::models::ResumeCursor;

/// User agent sent with every request unless configured.
pub const DEFAULT_USER_AGENT: &str = concat!("cc_news_ingest/", env!("CARGO_PKG_VERSION"));

/// Retry knobs as they appear in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_secs: policy.max_delay.as_secs(),
            jitter_ms: policy.jitter.as_millis() as u64,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_secs(settings.max_delay_secs),
            jitter: Duration::from_millis(settings.jitter_ms),
        }
    }
}

/// Settings of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target patterns, `host[/path-expression]`.
    pub patterns: Vec<String>,
    pub balance: Balance,
    /// Index records per batch.
    pub batch_size: usize,
    /// Where to start. The default is the origin.
    pub resume: ResumeCursor,
    /// Maximum in-flight lookups and fetches.
    pub concurrency: usize,
    /// Aggregate request rate limit. Unlimited when absent.
    pub requests_per_second: Option<u32>,
    pub retry: RetrySettings,
    pub catalog_url: String,
    pub archive_base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// End the run after a full round that found no index records.
    pub stop_when_exhausted: bool,
    /// Keyword lists for the topic classifier.
    pub topics: Option<TopicKeywords>,
    pub verbose: bool,
    /// Log to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            balance: Balance::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            resume: ResumeCursor::default(),
            concurrency: 1,
            requests_per_second: None,
            retry: RetrySettings::default(),
            catalog_url: COLLINFO_URL.to_string(),
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 60,
            stop_when_exhausted: true,
            topics: None,
            verbose: false,
            log_file: None,
        }
    }
}

impl IngestConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit(&self) -> Option<NonZeroU32> {
        self.requests_per_second.and_then(NonZeroU32::new)
    }

    /// Reject settings no run can work with.
    pub fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(IngestError::Config("no target patterns configured".to_string()));
        }
        if self.batch_size == 0 {
            return Err(IngestError::Config("batch_size must be at least 1".to_string()));
        }
        if self.concurrency == 0 {
            return Err(IngestError::Config("concurrency must be at least 1".to_string()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_secs.saturating_mul(1000) {
            return Err(IngestError::Config(
                "retry.base_delay_ms exceeds retry.max_delay_secs".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load an [`IngestConfig`] from a YAML file.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config(path: impl AsRef<Path>) -> Result<IngestConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Config(format!("cannot read {}: {e}", path.display())))?;
    let config: IngestConfig = serde_yaml::from_str(&raw)
        .map_err(|e| IngestError::Config(format!("cannot parse {}: {e}", path.display())))?;
    debug!(patterns = config.patterns.len(), balance = %config.balance, "Loaded configuration");
    Ok(config)
}
