//! Incremental WARC reader.
//!
//! Decodes WARC records one at a time from any [`BufRead`]. For `response`
//! records whose block is an HTTP message, the status line and HTTP headers
//! are split off from the payload.
//!
//! ```text
//! WARC/1.0\r\n
//! WARC-Type: response\r\n
//! WARC-Target-URI: https://example.com/a\r\n
//! Content-Length: 1234\r\n
//! \r\n
//! HTTP/1.1 200 OK\r\n ... \r\n\r\n <payload>
//! \r\n\r\n
//! ```

use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::{BufRead, BufReader, Cursor, Read};
use thiserror::Error;

use crate::models::HttpHeaders;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One decoded WARC record.
#[derive(Debug, Clone, Default)]
pub struct ArchiveEntry {
    /// Value of `WARC-Type`, e.g. `response`, `request`, `metadata`.
    pub record_type: String,
    pub target_uri: Option<String>,
    pub warc_headers: HttpHeaders,
    /// Status of the embedded HTTP response, when there is one.
    pub http_status: Option<u16>,
    pub http_headers: HttpHeaders,
    /// Payload (HTTP body for responses, whole block otherwise).
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum WarcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Reads [`ArchiveEntry`] values lazily. Stops after the first error.
pub struct WarcReader<R> {
    inner: R,
    done: bool,
}

impl WarcReader<Box<dyn BufRead + Send>> {
    /// Reader over a fetched byte range.
    ///
    /// A range starting with the gzip magic number is decoded as a single gzip
    /// member (an index entry's offset and length cover exactly one member, so
    /// trailing bytes are ignored). Anything else is read as plain WARC.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let inner: Box<dyn BufRead + Send> = if bytes.starts_with(&GZIP_MAGIC) {
            Box::new(BufReader::new(GzDecoder::new(Cursor::new(bytes))))
        } else {
            Box::new(Cursor::new(bytes))
        };
        Self::new(inner)
    }
}

impl<R: BufRead> WarcReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    fn read_line(&mut self) -> Result<Option<String>, WarcError> {
        let mut buf = Vec::new();
        if self.inner.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf).trim_end().to_string()))
    }

    fn read_entry(&mut self) -> Result<Option<ArchiveEntry>, WarcError> {
        let version = loop {
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !version.starts_with("WARC/") {
            return Err(WarcError::Malformed(format!("unexpected version line {version:?}")));
        }

        let mut warc_headers = HttpHeaders::new();
        loop {
            let line = self
                .read_line()?
                .ok_or_else(|| WarcError::Malformed("truncated header block".to_string()))?;
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                warc_headers.push(name.trim(), value.trim());
            }
        }

        let length: u64 = warc_headers
            .get("Content-Length")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| WarcError::Malformed("missing Content-Length".to_string()))?;

        let mut block = Vec::new();
        (&mut self.inner).take(length).read_to_end(&mut block)?;
        if (block.len() as u64) < length {
            return Err(WarcError::Malformed(format!(
                "block truncated: expected {length} bytes, got {}",
                block.len()
            )));
        }

        let record_type = warc_headers.get("WARC-Type").unwrap_or_default().to_string();
        let target_uri = warc_headers.get("WARC-Target-URI").map(str::to_string);

        let (http_status, http_headers, body) =
            if record_type == "response" && block.starts_with(b"HTTP/") {
                split_http(block)
            } else {
                (None, HttpHeaders::new(), block)
            };

        Ok(Some(ArchiveEntry {
            record_type,
            target_uri,
            warc_headers,
            http_status,
            http_headers,
            body,
        }))
    }
}

impl<R: BufRead> Iterator for WarcReader<R> {
    type Item = Result<ArchiveEntry, WarcError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Split an HTTP response block into status, headers and body.
fn split_http(block: Vec<u8>) -> (Option<u16>, HttpHeaders, Vec<u8>) {
    let (head_end, sep_len) = match find(&block, b"\r\n\r\n") {
        Some(i) => (i, 4),
        None => match find(&block, b"\n\n") {
            Some(i) => (i, 2),
            None => (block.len(), 0),
        },
    };

    let head = String::from_utf8_lossy(&block[..head_end]).into_owned();
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|status_line| status_line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok());

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    let body = block[(head_end + sep_len).min(block.len())..].to_vec();
    (status, headers, body)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
