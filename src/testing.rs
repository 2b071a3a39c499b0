//! Test doubles: a scripted transport, WARC fixture builders and
//! deterministic collaborators.

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use crate::collaborators::{
    ComplianceChecker, ExtractedArticle, Extractor, LanguageDetector,
};
use crate::error::{HttpError, IngestError};
use crate::http::{HttpResponse, RetryPolicy, Transport};
use crate::models::HttpHeaders;
use crate::warc::ArchiveEntry;

/// Retry policy without real waiting.
pub fn fast_policy(max_retries: usize) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: Duration::ZERO,
    }
}

/// Transport answering from per-URL scripts.
///
/// Queued answers are consumed first, then the URL's fixed answer, then 404.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Result<HttpResponse, String>>>>,
    fixed: Mutex<HashMap<String, HttpResponse>>,
    calls: Mutex<HashMap<String, usize>>,
    headers: Mutex<HashMap<String, Vec<(String, String)>>>,
    order: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, response: HttpResponse) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Ok(response));
    }

    pub fn push_error(&self, url: &str, message: &str) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn set(&self, url: &str, response: HttpResponse) {
        self.fixed.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.order.lock().unwrap().len()
    }

    /// URLs in request order.
    pub fn requested(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }

    pub fn last_headers(&self, url: &str) -> Vec<(String, String)> {
        self.headers
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, HttpError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.order.lock().unwrap().push(url.to_string());
        self.headers
            .lock()
            .unwrap()
            .insert(url.to_string(), headers.to_vec());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(HttpError::Transport(message)),
            None => Ok(self
                .fixed
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| HttpResponse::new(404, ""))),
        }
    }
}

/// One uncompressed WARC record.
pub fn warc_record(kind: &str, target_uri: &str, http_headers: &[(&str, &str)], body: &str) -> Vec<u8> {
    let mut block = Vec::new();
    if kind == "response" {
        block.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
        for (name, value) in http_headers {
            block.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        block.extend_from_slice(b"\r\n");
    }
    block.extend_from_slice(body.as_bytes());

    let mut out = Vec::new();
    out.extend_from_slice(b"WARC/1.0\r\n");
    out.extend_from_slice(format!("WARC-Type: {kind}\r\n").as_bytes());
    out.extend_from_slice(format!("WARC-Target-URI: {target_uri}\r\n").as_bytes());
    out.extend_from_slice(b"WARC-Date: 2024-08-02T10:00:00Z\r\n");
    out.extend_from_slice(format!("Content-Length: {}\r\n", block.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&block);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// Compress `bytes` as one gzip member.
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// A minimal news page.
pub fn article_html(title: &str, text: &str, lang: Option<&str>) -> String {
    let lang_attr = lang.map(|l| format!(" lang=\"{l}\"")).unwrap_or_default();
    format!(
        "<html{lang_attr}><head><title>{title}</title>\
         <meta property=\"article:published_time\" content=\"2024-08-01T09:30:00Z\"></head>\
         <body><article><p>{text}</p></article></body></html>"
    )
}

/// Compliance checker that rejects pages carrying `X-Block: 1`.
pub struct BlockHeaderCompliance;

impl ComplianceChecker for BlockHeaderCompliance {
    fn is_allowed(&self, headers: &HttpHeaders) -> bool {
        headers.get("X-Block") != Some("1")
    }
}

/// Extractor that treats the body as `title\ntext`.
pub struct PlainExtractor;

impl Extractor for PlainExtractor {
    fn extract(&self, entry: &ArchiveEntry) -> Result<ExtractedArticle, IngestError> {
        let body = String::from_utf8_lossy(&entry.body);
        if body.starts_with("FAIL") {
            return Err(IngestError::ExtractionFailed {
                url: entry.target_uri.clone().unwrap_or_default(),
                reason: "scripted failure".to_string(),
            });
        }
        let (title, text) = body.split_once('\n').unwrap_or(("", &body));
        Ok(ExtractedArticle {
            title: Some(title.to_string()).filter(|t| !t.is_empty()),
            maintext: Some(text.trim().to_string()),
            date_publish: None,
            language: entry.http_headers.get("Content-Language").map(str::to_string),
            url: entry.target_uri.clone(),
        })
    }
}

/// Detector that always answers with a fixed code.
pub struct FixedDetector(pub &'static str);

impl LanguageDetector for FixedDetector {
    fn detect(&self, _text: &str) -> Result<String, IngestError> {
        Ok(self.0.to_string())
    }
}
