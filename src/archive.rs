//! Filtering and extraction over the entries of one fetched byte range.
//!
//! Entries pass through these steps in order, and the first failing step
//! drops the entry:
//!
//! 1. record type must be `response`
//! 2. `WARC-Target-URI` must contain the pattern's host
//! 3. compliance checker on the HTTP headers
//! 4. extractor
//! 5. main text must be non-empty
//! 6. language detection when the page declares none (failure leaves it unset)

use bytes::Bytes;
use std::io::BufRead;
use tracing::{debug, warn};

use crate::collaborators::Collaborators;
use crate::models::{ArticleRecord, CrawlIndex};
use crate::pattern::TargetPattern;
use crate::warc::{ArchiveEntry, WarcReader};

/// Lazy iterator of [`ArticleRecord`] decoded from one archive byte range.
///
/// The stream owns its byte source. A malformed entry ends the stream.
pub struct ArchiveRecordStream {
    reader: WarcReader<Box<dyn BufRead + Send>>,
    collaborators: Collaborators,
    host: String,
    crawl_index: String,
}

impl ArchiveRecordStream {
    pub fn new(
        bytes: Bytes,
        index: &CrawlIndex,
        pattern: &TargetPattern,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            reader: WarcReader::from_bytes(bytes),
            collaborators,
            host: pattern.host().to_ascii_lowercase(),
            crawl_index: index.id.clone(),
        }
    }

    fn process(&self, entry: ArchiveEntry) -> Option<ArticleRecord> {
        if entry.record_type != "response" {
            return None;
        }

        let target_uri = entry.target_uri.clone().unwrap_or_default();
        if !target_uri.to_ascii_lowercase().contains(&self.host) {
            debug!(uri = %target_uri, host = %self.host, "Skipping entry for another host");
            return None;
        }

        if !self.collaborators.compliance.is_allowed(&entry.http_headers) {
            debug!(uri = %target_uri, "Skipping entry that opted out");
            return None;
        }

        let extracted = match self.collaborators.extractor.extract(&entry) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(uri = %target_uri, error = %e, "Extraction failed; skipping entry");
                return None;
            }
        };

        let maintext = extracted.maintext.unwrap_or_default();
        if maintext.trim().is_empty() {
            debug!(uri = %target_uri, "Skipping entry without main text");
            return None;
        }

        let language = match extracted.language.filter(|l| !l.trim().is_empty()) {
            Some(language) => Some(language),
            None => match self.collaborators.detector.detect(&maintext) {
                Ok(language) => Some(language),
                Err(e) => {
                    warn!(uri = %target_uri, error = %e, "Language detection failed");
                    None
                }
            },
        };

        let url = extracted.url.filter(|u| !u.is_empty()).unwrap_or(target_uri);
        Some(ArticleRecord {
            source_domain: ArticleRecord::domain_of(&url),
            url,
            title: extracted.title,
            maintext,
            date_publish: extracted.date_publish,
            language,
            crawl_index: self.crawl_index.clone(),
            tags: Vec::new(),
        })
    }
}

impl Iterator for ArchiveRecordStream {
    type Item = ArticleRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.next()? {
                Ok(entry) => {
                    if let Some(article) = self.process(entry) {
                        return Some(article);
                    }
                }
                Err(e) => {
                    warn!(index = %self.crawl_index, error = %e, "Malformed archive entry; abandoning record");
                    return None;
                }
            }
        }
    }
}
