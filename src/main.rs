//! # cc_news_ingest
//!
//! Streams news articles out of CommonCrawl into a JSON Lines file.
//!
//! ## Usage
//!
//! ```sh
//! cc_news_ingest -u 'example.com/2020/*' -o articles.jsonl --state-file state.json
//! ```
//!
//! With `--state-file`, every checkpoint is saved after the articles before
//! it are flushed, and the next run resumes where this one stopped.

use cc_news_ingest::cli::Cli;
use cc_news_ingest::collaborators::HeaderOptOut;
use cc_news_ingest::outputs::{filter::ArticleFilter, json::JsonlSink, state};
use cc_news_ingest::utils::ensure_writable_parent;
use cc_news_ingest::{
    Collaborators, HttpClient, IngestConfig, IngestionPipeline, PipelineEvent,
    ReqwestTransport, load_config,
};
use clap::Parser;
use futures::StreamExt;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => IngestConfig::default(),
    };
    args.apply(&mut config)?;

    init_tracing(config.verbose, config.log_file.as_deref())?;
    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "cc_news_ingest starting up");
    debug!(?args, "Parsed CLI arguments");

    if let Some(state_file) = &args.state_file {
        if args.has_resume_flags() {
            info!("Resume flags given; ignoring the saved cursor");
        } else if let Some(cursor) = state::read_cursor(state_file).await? {
            config.resume = cursor;
        }
        ensure_writable_parent(state_file).await?;
    }
    if let Some(output) = &args.output {
        ensure_writable_parent(output).await?;
    }

    // ---- Shared HTTP client ----
    let transport = ReqwestTransport::new(&config.user_agent, config.request_timeout())?;
    let mut http = HttpClient::new(Arc::new(transport), config.retry_policy());
    if let Some(rps) = config.rate_limit() {
        info!(rps = rps.get(), "Rate limiting requests");
        http = http.with_rate_limit(rps);
    }

    let agent = config.user_agent.split('/').next().unwrap_or_default();
    let collaborators = Collaborators {
        compliance: Arc::new(HeaderOptOut::for_agent(agent)),
        ..Collaborators::default()
    };

    let filter = ArticleFilter::from_cli(&args, &config);

    let pipeline = match IngestionPipeline::start(&config, collaborators, http).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Cannot start ingestion");
            return Err(e.into());
        }
    };

    // ---- Stream articles ----
    let mut sink = JsonlSink::open(args.output.as_deref()).await?;
    let mut events = pipeline.events();
    let mut skipped = 0usize;
    let mut limit_reached = false;

    while let Some(event) = events.next().await {
        match event {
            PipelineEvent::Article(article) => {
                match filter.apply(article) {
                    Some(article) => sink.write(&article).await?,
                    None => skipped += 1,
                }
                // With a state file the current coordinate is finished first,
                // so the saved cursor does not replay it.
                if !limit_reached && args.limit.is_some_and(|limit| sink.written() >= limit) {
                    info!(written = sink.written(), "Reached article limit");
                    if args.state_file.is_none() {
                        break;
                    }
                    limit_reached = true;
                }
            }
            PipelineEvent::Checkpoint(cursor) => {
                if let Some(state_file) = &args.state_file {
                    sink.flush().await?;
                    state::write_cursor(state_file, &cursor).await?;
                }
                if limit_reached {
                    break;
                }
            }
        }
    }
    sink.flush().await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        written = sink.written(),
        skipped,
        "Execution complete"
    );
    Ok(())
}

fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
