//! Typed errors for the ingestion pipeline.
//!
//! Only [`IngestError::CatalogUnavailable`], [`IngestError::InvalidResumePosition`],
//! [`IngestError::InvalidPattern`] and [`IngestError::Config`] stop a run. The
//! remaining variants describe per-unit failures that are logged and skipped
//! at the granularity they occurred at.

use thiserror::Error;

/// Errors raised by the ingestion pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The crawl index listing could not be fetched, parsed, or was empty.
    #[error("crawl index catalog unavailable: {reason}")]
    CatalogUnavailable { reason: String },

    /// The resume cursor references an index or pattern that does not exist.
    #[error("invalid resume position: {reason}")]
    InvalidResumePosition { reason: String },

    /// Index lookup for one coordinate failed.
    #[error("lookup failed for {index} / {pattern} (batch {batch}): {reason}")]
    LookupFailed {
        index: String,
        pattern: String,
        batch: u64,
        reason: String,
    },

    /// Archive range fetch for one record failed.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// Article extraction failed for one archive entry.
    #[error("extraction failed for {url}: {reason}")]
    ExtractionFailed { url: String, reason: String },

    /// Language detection produced no result.
    #[error("language detection failed: {reason}")]
    DetectionFailed { reason: String },

    /// A target pattern could not be parsed.
    #[error("invalid target pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(String),
}

/// Errors from the HTTP layer.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection, timeout, or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Retryable failures persisted past the retry budget.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: String },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_failed_message_has_context() {
        let e = IngestError::LookupFailed {
            index: "CC-MAIN-2024-33".into(),
            pattern: "example.com".into(),
            batch: 2,
            reason: "HTTP status 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("CC-MAIN-2024-33"));
        assert!(msg.contains("batch 2"));
    }
}
