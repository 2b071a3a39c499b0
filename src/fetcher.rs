//! Byte-range downloads of archive records.

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::error::{IngestError, Result};
use crate::http::HttpClient;
use crate::models::IndexRecord;

/// Public host of the crawl archive files.
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://data.commoncrawl.org";

/// Downloads the compressed archive record an [`IndexRecord`] points at.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    http: HttpClient,
    base_url: String,
}

impl ArchiveFetcher {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full URL of the archive file holding `record`.
    pub fn file_url(&self, record: &IndexRecord) -> String {
        format!("{}/{}", self.base_url, record.filename.trim_start_matches('/'))
    }

    /// `Range` header value for `record`.
    ///
    /// The end offset is `offset + length`, one byte past the record. The
    /// extra byte is harmless since only the first gzip member is decoded.
    pub fn range_header(record: &IndexRecord) -> String {
        format!(
            "bytes={}-{}",
            record.offset,
            record.offset.saturating_add(record.length)
        )
    }

    #[instrument(level = "debug", skip_all, fields(url = %record.url, file = %record.filename))]
    pub async fn fetch(&self, record: &IndexRecord) -> Result<Bytes> {
        let url = self.file_url(record);
        let headers = [("Range".to_string(), Self::range_header(record))];

        let failed = |reason: String| IngestError::FetchFailed {
            url: record.url.clone(),
            reason,
        };

        let response = self
            .http
            .get(&url, &headers)
            .await
            .map_err(|e| failed(e.to_string()))?;

        // Anything but a partial answer holds other records (or the whole
        // file), not the one at `offset`.
        if response.status != 206 {
            return Err(failed(format!(
                "expected 206 Partial Content for {}, got HTTP status {} from {url}",
                Self::range_header(record),
                response.status
            )));
        }

        debug!(bytes = response.body.len(), "Fetched archive record");
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::testing::{ScriptedTransport, fast_policy, gzip, warc_record};
    use std::sync::Arc;

    fn record() -> IndexRecord {
        IndexRecord {
            url: "https://example.com/2020/01/foo".to_string(),
            filename: "crawl-data/CC-MAIN-2024-33/segments/1/warc/a.warc.gz".to_string(),
            offset: 1000,
            length: 500,
        }
    }

    const FILE_URL: &str =
        "https://data.commoncrawl.org/crawl-data/CC-MAIN-2024-33/segments/1/warc/a.warc.gz";

    #[test]
    fn test_range_header() {
        assert_eq!(ArchiveFetcher::range_header(&record()), "bytes=1000-1500");
    }

    #[tokio::test]
    async fn test_fetch_sends_range_request() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(FILE_URL, HttpResponse::new(206, "payload"));

        let fetcher = ArchiveFetcher::new(
            HttpClient::new(transport.clone(), fast_policy(0)),
            "https://data.commoncrawl.org/",
        );
        let bytes = fetcher.fetch(&record()).await.unwrap();

        assert_eq!(&bytes[..], b"payload");
        assert_eq!(
            transport.last_headers(FILE_URL),
            vec![("Range".to_string(), "bytes=1000-1500".to_string())]
        );
    }

    #[tokio::test]
    async fn test_retries_are_transparent() {
        let direct = Arc::new(ScriptedTransport::new());
        direct.push(FILE_URL, HttpResponse::new(206, "payload"));

        let flaky = Arc::new(ScriptedTransport::new());
        flaky.push(FILE_URL, HttpResponse::new(503, ""));
        flaky.push_error(FILE_URL, "connection reset");
        flaky.push(FILE_URL, HttpResponse::new(502, ""));
        flaky.push(FILE_URL, HttpResponse::new(206, "payload"));

        let a = ArchiveFetcher::new(HttpClient::new(direct, fast_policy(5)), DEFAULT_ARCHIVE_BASE_URL);
        let b = ArchiveFetcher::new(HttpClient::new(flaky.clone(), fast_policy(5)), DEFAULT_ARCHIVE_BASE_URL);

        assert_eq!(a.fetch(&record()).await.unwrap(), b.fetch(&record()).await.unwrap());
        assert_eq!(flaky.calls(FILE_URL), 4);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set(FILE_URL, HttpResponse::new(500, ""));

        let fetcher = ArchiveFetcher::new(
            HttpClient::new(transport.clone(), fast_policy(3)),
            DEFAULT_ARCHIVE_BASE_URL,
        );
        let err = fetcher.fetch(&record()).await.unwrap_err();

        assert!(matches!(err, IngestError::FetchFailed { .. }));
        assert_eq!(transport.calls(FILE_URL), 4);
    }

    #[tokio::test]
    async fn test_ignored_range_is_fetch_failed() {
        let mut file = gzip(&warc_record("warcinfo", "", &[], "software: test"));
        file.extend(gzip(&warc_record(
            "response",
            "https://example.com/2020/01/foo",
            &[],
            "<p>story</p>",
        )));

        let transport = Arc::new(ScriptedTransport::new());
        transport.set(FILE_URL, HttpResponse::new(200, file));
        let fetcher = ArchiveFetcher::new(HttpClient::new(transport.clone(), fast_policy(3)), DEFAULT_ARCHIVE_BASE_URL);

        match fetcher.fetch(&record()).await {
            Err(IngestError::FetchFailed { url, reason }) => {
                assert_eq!(url, "https://example.com/2020/01/foo");
                assert!(reason.contains("206"), "{reason}");
                assert!(reason.contains("200"), "{reason}");
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }
        assert_eq!(transport.calls(FILE_URL), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_fetch_failed() {
        let transport = Arc::new(ScriptedTransport::new());
        let fetcher = ArchiveFetcher::new(HttpClient::new(transport, fast_policy(3)), DEFAULT_ARCHIVE_BASE_URL);
        assert!(matches!(
            fetcher.fetch(&record()).await,
            Err(IngestError::FetchFailed { .. })
        ));
    }
}
