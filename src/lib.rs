//! # cc_news_ingest
//!
//! Balanced, resumable ingestion of news articles from the CommonCrawl
//! crawl indices and WARC archives.
//!
//! ## Architecture
//!
//! The pipeline pulls one unit of work at a time:
//! 1. **Catalog**: load the crawl indices and order them by a balancing policy
//! 2. **Scheduling**: walk (batch × index × pattern) from a resume cursor
//! 3. **Lookup**: fetch the index records of one batch for one (index, pattern)
//! 4. **Fetching**: download each record's byte range from archive storage
//! 5. **Decoding**: read WARC entries, filter, extract and detect language
//!
//! ```no_run
//! use cc_news_ingest::{Collaborators, HttpClient, IngestConfig, IngestionPipeline, ReqwestTransport};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestConfig {
//!     patterns: vec!["example.com/2020/*".to_string()],
//!     ..IngestConfig::default()
//! };
//! let transport = ReqwestTransport::new(&config.user_agent, config.request_timeout())?;
//! let http = HttpClient::new(Arc::new(transport), config.retry_policy());
//!
//! let mut articles = IngestionPipeline::start(&config, Collaborators::default(), http)
//!     .await?
//!     .articles();
//! while let Some(article) = articles.next().await {
//!     println!("{}", article.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod catalog;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod lookup;
pub mod models;
pub mod outputs;
pub mod pattern;
pub mod pipeline;
pub mod scheduler;
pub mod utils;
pub mod warc;

#[cfg(test)]
mod testing;

pub use catalog::{Balance, IndexCatalog};
pub use collaborators::Collaborators;
pub use config::{IngestConfig, load_config};
pub use error::{IngestError, Result};
pub use http::{HttpClient, ReqwestTransport, RetryPolicy, Transport};
pub use models::{ArticleRecord, CrawlIndex, IndexRecord, ResumeCursor};
pub use pattern::TargetPattern;
pub use pipeline::{IngestionPipeline, PipelineEvent};
pub use scheduler::{BatchCoordinate, BatchScheduler};
