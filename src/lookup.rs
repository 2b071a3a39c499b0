//! Index lookups for one batch coordinate.
//!
//! A lookup asks the index's CDX endpoint for every capture of the pattern's
//! host (or of a literal path prefix), keeps the records whose path matches
//! the pattern, and returns only the chunk belonging to the coordinate's
//! batch number.
//!
//! ```text
//! {cdx-api}?url=example.com%2F2020%2F&matchType=prefix&output=json&fl=url,offset,length,filename
//! ```

use tracing::{debug, info, instrument, warn};

use crate::error::{IngestError, Result};
use crate::http::HttpClient;
use crate::models::{CrawlIndex, IndexRecord};
use crate::pattern::TargetPattern;
use crate::scheduler::BatchCoordinate;
use crate::utils::truncate_for_log;

/// Fields requested from the lookup endpoint.
pub const LOOKUP_FIELDS: &str = "url,offset,length,filename";

/// Records per batch when not configured.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Queries crawl index lookup endpoints.
#[derive(Debug, Clone)]
pub struct RecordIndexClient {
    http: HttpClient,
    batch_size: usize,
}

impl RecordIndexClient {
    pub fn new(http: HttpClient, batch_size: usize) -> Self {
        Self {
            http,
            batch_size: batch_size.max(1),
        }
    }

    /// Lookup URL for one (index, pattern) pair.
    pub fn query_url(index: &CrawlIndex, pattern: &TargetPattern) -> String {
        let (target, match_type) = match pattern.literal_prefix() {
            Some(prefix) if !prefix.is_empty() => (format!("{}/{}", pattern.host(), prefix), "prefix"),
            _ => (pattern.host().to_string(), "host"),
        };
        format!(
            "{}?url={}&matchType={}&output=json&fl={}",
            index.cdx_api,
            urlencoding::encode(&target),
            match_type,
            LOOKUP_FIELDS
        )
    }

    /// Records of `coordinate`'s batch. Failures are logged and yield an
    /// empty batch.
    pub async fn lookup(&self, coordinate: &BatchCoordinate) -> Vec<IndexRecord> {
        match self.try_lookup(coordinate).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    batch = coordinate.batch,
                    index = %coordinate.index.id,
                    pattern = %coordinate.pattern,
                    error = %e,
                    "Lookup failed; skipping coordinate"
                );
                Vec::new()
            }
        }
    }

    /// Like [`lookup`](Self::lookup) but surfaces [`IngestError::LookupFailed`].
    #[instrument(level = "info", skip_all, fields(batch = coordinate.batch, index = %coordinate.index.id, pattern = %coordinate.pattern))]
    pub async fn try_lookup(&self, coordinate: &BatchCoordinate) -> Result<Vec<IndexRecord>> {
        info!("Processing batch");
        let url = Self::query_url(&coordinate.index, &coordinate.pattern);
        let failed = |reason: String| IngestError::LookupFailed {
            index: coordinate.index.id.clone(),
            pattern: coordinate.pattern.source().to_string(),
            batch: coordinate.batch,
            reason,
        };

        let response = self
            .http
            .get(&url, &[])
            .await
            .map_err(|e| failed(e.to_string()))?;

        if response.status == 404 {
            debug!("No captures for this filter");
            return Ok(Vec::new());
        }
        if response.status >= 300 {
            return Err(failed(format!(
                "HTTP status {}: {}",
                response.status,
                truncate_for_log(response.text().trim(), 200)
            )));
        }

        let records: Vec<IndexRecord> = parse_records(&response.text())
            .into_iter()
            .filter(|record| coordinate.pattern.matches_url(&record.url))
            .collect();
        let matched = records.len();
        let selected = select_batch(records, self.batch_size, coordinate.batch);

        info!(matched, selected = selected.len(), "Index lookup complete");
        Ok(selected)
    }
}

/// Parse an NDJSON lookup body. Unparseable lines are logged and skipped.
pub fn parse_records(body: &str) -> Vec<IndexRecord> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<IndexRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, line = %truncate_for_log(line, 200), "Skipping unparseable index line");
                None
            }
        })
        .collect()
}

/// Chunk `records` into groups of `batch_size` and keep the group at `batch`.
/// An out-of-range batch is empty.
pub fn select_batch(records: Vec<IndexRecord>, batch_size: usize, batch: u64) -> Vec<IndexRecord> {
    let Ok(batch) = usize::try_from(batch) else {
        return Vec::new();
    };
    records
        .chunks(batch_size.max(1))
        .nth(batch)
        .map(<[IndexRecord]>::to_vec)
        .unwrap_or_default()
}
