//! Data models shared across the pipeline.
//!
//! - [`CrawlIndex`]: one dated snapshot of the CommonCrawl index
//! - [`IndexRecord`]: an archive location returned by an index lookup
//! - [`HttpHeaders`]: an ordered, case-insensitive header list
//! - [`ArticleRecord`]: the final output unit
//! - [`ResumeCursor`]: the opaque restart marker

use serde::{Deserialize, Deserializer, Serialize};

/// One crawl index listed in `collinfo.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlIndex {
    /// Stable identity, e.g. `CC-MAIN-2024-33`.
    pub id: String,
    /// Human readable name, e.g. `August 2024 Index`.
    pub name: String,
    /// Lookup endpoint of this index.
    pub cdx_api: String,
    /// Start of the crawl period as listed.
    pub from: String,
    /// Year derived from `from`.
    pub year: i32,
}

/// A pointer into archive storage returned by the index lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub url: String,
    pub filename: String,
    #[serde(deserialize_with = "number_or_string")]
    pub offset: u64,
    #[serde(deserialize_with = "number_or_string")]
    pub length: u64,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// HTTP or WARC headers in wire order. Lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeaders(Vec<(String, String)>);

impl HttpHeaders {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HttpHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// An extracted news article, the unit handed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// URL of the captured page.
    pub url: String,
    pub title: Option<String>,
    pub maintext: String,
    /// Publish date as `YYYY-MM-DD HH:MM:SS` when known.
    pub date_publish: Option<String>,
    /// ISO 639-1 code, declared by the page or detected.
    pub language: Option<String>,
    /// Host of `url` without a leading `www.`.
    pub source_domain: Option<String>,
    /// Crawl index the capture was located through.
    pub crawl_index: String,
    /// Labels attached by downstream classifiers.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ArticleRecord {
    /// Host of a URL without a leading `www.`.
    ///
    /// For example: "https://www.example.com/article" -> "example.com"
    pub fn domain_of(url: &str) -> Option<String> {
        url::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_owned))
            .map(|host| host.trim_start_matches("www.").to_string())
    }
}

/// Restart marker for the batch scheduler.
///
/// The default cursor is the origin: batch 0, first index, first pattern.
/// `index` is a [`CrawlIndex::id`], `pattern` a target pattern's source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCursor {
    #[serde(default)]
    pub batch: u64,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ResumeCursor {
    pub fn new(batch: u64, index: Option<String>, pattern: Option<String>) -> Self {
        Self {
            batch,
            index,
            pattern,
        }
    }

    pub fn is_origin(&self) -> bool {
        self.batch == 0 && self.index.is_none() && self.pattern.is_none()
    }
}
