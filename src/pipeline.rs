//! The ingestion pipeline: catalog, scheduler, lookup, fetch and decode
//! composed into one lazy stream.
//!
//! ```text
//! BatchScheduler ──► lookup (buffered n) ──► round tracking
//!                                               │
//!            ┌──────────────────────────────────┘
//!            ▼
//!   Record, Record, ..., Done ──► fetch + decode (buffered n) ──► events
//! ```
//!
//! Both stages use ordered buffering, so with any concurrency the output is
//! in scheduler order, then archive order within one record. After the last
//! record of a coordinate a checkpoint carries the cursor of the next one.

use futures::stream::{self, BoxStream, StreamExt};
use itertools::Itertools;
use std::iter;
use tracing::{info, instrument, warn};

use crate::archive::ArchiveRecordStream;
use crate::catalog::IndexCatalog;
use crate::collaborators::Collaborators;
use crate::config::IngestConfig;
use crate::error::Result;
use crate::fetcher::ArchiveFetcher;
use crate::http::HttpClient;
use crate::lookup::RecordIndexClient;
use crate::models::{ArticleRecord, IndexRecord, ResumeCursor};
use crate::pattern::TargetPattern;
use crate::scheduler::{BatchCoordinate, BatchScheduler};

/// Items of [`IngestionPipeline::events`].
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Article(ArticleRecord),
    /// Every coordinate before this cursor has been fully processed.
    Checkpoint(ResumeCursor),
}

enum WorkItem {
    Record(BatchCoordinate, IndexRecord),
    Done(ResumeCursor),
}

/// A ready-to-run ingestion.
pub struct IngestionPipeline {
    scheduler: BatchScheduler,
    lookup: RecordIndexClient,
    fetcher: ArchiveFetcher,
    collaborators: Collaborators,
    concurrency: usize,
    stop_when_exhausted: bool,
}

impl IngestionPipeline {
    /// Load the catalog, parse patterns and position the scheduler at the
    /// configured resume cursor.
    ///
    /// Fails on bad configuration or patterns, an unavailable catalog, or a
    /// cursor that names an unknown index or pattern. No other network call
    /// happens until the returned stream is polled.
    #[instrument(level = "info", skip_all, fields(balance = %config.balance, batch_size = config.batch_size))]
    pub async fn start(
        config: &IngestConfig,
        collaborators: Collaborators,
        http: HttpClient,
    ) -> Result<Self> {
        config.validate()?;
        let patterns = parse_patterns(&config.patterns)?;

        let indices = IndexCatalog::new(http.clone(), &config.catalog_url, config.balance)
            .load()
            .await?;

        let scheduler = BatchScheduler::new(indices, patterns).resume(&config.resume)?;
        info!(
            indices = scheduler.indices().len(),
            patterns = scheduler.patterns().len(),
            resume_batch = config.resume.batch,
            resume_index = config.resume.index.as_deref().unwrap_or(""),
            resume_pattern = config.resume.pattern.as_deref().unwrap_or(""),
            concurrency = config.concurrency,
            "Pipeline ready"
        );

        Ok(Self {
            scheduler,
            lookup: RecordIndexClient::new(http.clone(), config.batch_size),
            fetcher: ArchiveFetcher::new(http, &config.archive_base_url),
            collaborators,
            concurrency: config.concurrency.max(1),
            stop_when_exhausted: config.stop_when_exhausted,
        })
    }

    /// Cursor of the first coordinate this pipeline will process.
    pub fn position(&self) -> ResumeCursor {
        self.scheduler.position()
    }

    /// Articles interleaved with checkpoints.
    pub fn events(self) -> BoxStream<'static, PipelineEvent> {
        let Self {
            scheduler,
            lookup,
            fetcher,
            collaborators,
            concurrency,
            stop_when_exhausted,
        } = self;

        let last = (
            scheduler.indices().len().saturating_sub(1),
            scheduler.patterns().len().saturating_sub(1),
        );
        let successors = scheduler.clone();

        let lookups = stream::iter(scheduler)
            .map(move |coordinate| {
                let lookup = lookup.clone();
                async move {
                    let records = lookup.lookup(&coordinate).await;
                    (coordinate, records)
                }
            })
            .buffered(concurrency)
            .boxed();

        let bounded = stream::unfold(
            (lookups, RoundTracker::default()),
            move |(mut lookups, mut round)| async move {
                if round.finished {
                    return None;
                }
                let (coordinate, records) = lookups.next().await?;
                if stop_when_exhausted && round.observe(&coordinate, records.len(), last) {
                    info!(batch = coordinate.batch, "A full round found no index records; stopping");
                    round.finished = true;
                }
                Some(((coordinate, records), (lookups, round)))
            },
        );

        bounded
            .flat_map(move |(coordinate, records)| {
                let done = WorkItem::Done(successors.successor(&coordinate));
                let items: Vec<WorkItem> = records
                    .into_iter()
                    .map(|record| WorkItem::Record(coordinate.clone(), record))
                    .chain(iter::once(done))
                    .collect();
                stream::iter(items)
            })
            .map(move |item| {
                let fetcher = fetcher.clone();
                let collaborators = collaborators.clone();
                async move { process(item, &fetcher, collaborators).await }
            })
            .buffered(concurrency)
            .flat_map(stream::iter)
            .boxed()
    }

    /// Articles only.
    pub fn articles(self) -> BoxStream<'static, ArticleRecord> {
        self.events()
            .filter_map(|event| async move {
                match event {
                    PipelineEvent::Article(article) => Some(article),
                    PipelineEvent::Checkpoint(_) => None,
                }
            })
            .boxed()
    }
}

async fn process(
    item: WorkItem,
    fetcher: &ArchiveFetcher,
    collaborators: Collaborators,
) -> Vec<PipelineEvent> {
    match item {
        WorkItem::Done(cursor) => vec![PipelineEvent::Checkpoint(cursor)],
        WorkItem::Record(coordinate, record) => match fetcher.fetch(&record).await {
            // Gzip, HTML parsing and language detection are CPU bound.
            Ok(bytes) => {
                let decoded = tokio::task::spawn_blocking(move || {
                    ArchiveRecordStream::new(bytes, &coordinate.index, &coordinate.pattern, collaborators)
                        .map(PipelineEvent::Article)
                        .collect::<Vec<_>>()
                })
                .await;
                decoded.unwrap_or_else(|e| {
                    warn!(url = %record.url, error = %e, "Decoding task failed; skipping record");
                    Vec::new()
                })
            }
            Err(e) => {
                warn!(
                    batch = coordinate.batch,
                    index = %coordinate.index.id,
                    pattern = %coordinate.pattern,
                    error = %e,
                    "Fetch failed; skipping record"
                );
                Vec::new()
            }
        },
    }
}

/// Counts index records per round to detect a fully exhausted round.
#[derive(Debug, Default)]
struct RoundTracker {
    /// The current round was observed from its first coordinate.
    from_start: bool,
    records: usize,
    finished: bool,
}

impl RoundTracker {
    /// Whether `coordinate` closes a complete round without any records.
    fn observe(&mut self, coordinate: &BatchCoordinate, found: usize, last: (usize, usize)) -> bool {
        if coordinate.index_pos == 0 && coordinate.pattern_pos == 0 {
            self.from_start = true;
            self.records = 0;
        }
        self.records += found;
        (coordinate.index_pos, coordinate.pattern_pos) == last && self.from_start && self.records == 0
    }
}

/// Parse target patterns, keeping the first of any duplicates.
fn parse_patterns(raw: &[String]) -> Result<Vec<TargetPattern>> {
    let parsed = raw
        .iter()
        .map(|p| TargetPattern::parse(p))
        .collect::<Result<Vec<_>>>()?;
    let total = parsed.len();
    let unique: Vec<_> = parsed
        .into_iter()
        .unique_by(|p| p.source().to_string())
        .collect();
    if unique.len() < total {
        warn!(dropped = total - unique.len(), "Ignoring duplicate target patterns");
    }
    Ok(unique)
}
