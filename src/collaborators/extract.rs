//! HTML article extraction.
//!
//! Pulls the title, main text, publish date and declared language out of a
//! captured HTML response using CSS selectors:
//!
//! - **title**: `og:title`, then `<title>`, then the first `<h1>`
//! - **main text**: paragraphs inside `<article>`, falling back to every
//!   paragraph of `<body>`
//! - **date**: `article:published_time` style meta tags, then `<time datetime>`
//! - **language**: `<html lang>`, then `Content-Language` (meta or header)
//!
//! Bodies are decoded with the `charset` of the `Content-Type` header, else a
//! `<meta>` charset near the top of the page, else UTF-8. A byte order mark
//! overrides both.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use scraper::{ElementRef, Html, Selector};
use std::borrow::Cow;
use tracing::{debug, instrument};

use crate::collaborators::{ExtractedArticle, Extractor};
use crate::error::IngestError;
use crate::warc::ArchiveEntry;

const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How far into the body a `<meta>` charset declaration is looked for.
const CHARSET_SNIFF_BYTES: usize = 1024;

static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^>]*?charset\s*=\s*["']?\s*([a-z0-9_.:-]+)"#)
        .unwrap_or_else(|e| panic!("invalid built-in charset pattern: {e}"))
});

static OG_TITLE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:title"]"#));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static ARTICLE_PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("article p"));
static BODY_PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("body p"));
static DATE_META: Lazy<Selector> = Lazy::new(|| {
    selector(
        r#"meta[property="article:published_time"], meta[property="og:published_time"], meta[name="pubdate"], meta[name="publish-date"], meta[name="date"], meta[itemprop="datePublished"]"#,
    )
});
static TIME_DATETIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static HTML_LANG: Lazy<Selector> = Lazy::new(|| selector("html[lang]"));
static META_LANGUAGE: Lazy<Selector> = Lazy::new(|| {
    selector(r#"meta[http-equiv="content-language"], meta[http-equiv="Content-Language"]"#)
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

/// Default [`Extractor`] for HTML news pages.
#[derive(Debug, Clone)]
pub struct HtmlExtractor {
    /// Paragraphs shorter than this many characters are ignored.
    min_paragraph_chars: usize,
}

impl Default for HtmlExtractor {
    fn default() -> Self {
        Self {
            min_paragraph_chars: 1,
        }
    }
}

impl HtmlExtractor {
    pub fn with_min_paragraph_chars(min_paragraph_chars: usize) -> Self {
        Self { min_paragraph_chars }
    }

    fn paragraphs(&self, document: &Html, which: &Selector) -> Vec<String> {
        document
            .select(which)
            .map(element_text)
            .filter(|p| p.chars().count() >= self.min_paragraph_chars.max(1))
            .collect()
    }
}

impl Extractor for HtmlExtractor {
    #[instrument(level = "debug", skip_all, fields(url = entry.target_uri.as_deref().unwrap_or("")))]
    fn extract(&self, entry: &ArchiveEntry) -> Result<ExtractedArticle, IngestError> {
        let url = entry.target_uri.clone().unwrap_or_default();

        if let Some(content_type) = entry.http_headers.get("Content-Type") {
            let lowered = content_type.to_ascii_lowercase();
            if !lowered.contains("html") {
                return Err(IngestError::ExtractionFailed {
                    url,
                    reason: format!("unsupported content type {content_type:?}"),
                });
            }
        }
        if entry.body.is_empty() {
            return Err(IngestError::ExtractionFailed {
                url,
                reason: "empty body".to_string(),
            });
        }

        let html = decode_body(entry);
        let document = Html::parse_document(&html);

        let title = document
            .select(&OG_TITLE)
            .filter_map(|e| e.value().attr("content"))
            .map(collapse_whitespace)
            .find(|t| !t.is_empty())
            .or_else(|| first_text(&document, &TITLE))
            .or_else(|| first_text(&document, &H1));

        let mut paragraphs = self.paragraphs(&document, &ARTICLE_PARAGRAPHS);
        if paragraphs.is_empty() {
            paragraphs = self.paragraphs(&document, &BODY_PARAGRAPHS);
        }
        let maintext = Some(paragraphs.join("\n")).filter(|t| !t.is_empty());

        let date_publish = document
            .select(&DATE_META)
            .filter_map(|e| e.value().attr("content"))
            .chain(
                document
                    .select(&TIME_DATETIME)
                    .filter_map(|e| e.value().attr("datetime")),
            )
            .find_map(normalize_date);

        let language = document
            .select(&HTML_LANG)
            .filter_map(|e| e.value().attr("lang"))
            .chain(
                document
                    .select(&META_LANGUAGE)
                    .filter_map(|e| e.value().attr("content")),
            )
            .chain(entry.http_headers.get("Content-Language"))
            .find_map(primary_language);

        debug!(
            has_title = title.is_some(),
            text_chars = maintext.as_ref().map(|t| t.len()).unwrap_or(0),
            ?language,
            "Extracted article fields"
        );

        Ok(ExtractedArticle {
            title,
            maintext,
            date_publish,
            language,
            url: entry.target_uri.clone(),
        })
    }
}

fn decode_body(entry: &ArchiveEntry) -> Cow<'_, str> {
    let declared = entry
        .http_headers
        .get("Content-Type")
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| {
            let head = &entry.body[..entry.body.len().min(CHARSET_SNIFF_BYTES)];
            META_CHARSET
                .captures(head)
                .and_then(|c| c.get(1))
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        });
    let (text, _, _) = declared.unwrap_or(UTF_8).decode(&entry.body);
    text
}

/// `text/html; charset="ISO-8859-1"` -> `ISO-8859-1`.
fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']))
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn first_text(document: &Html, which: &Selector) -> Option<String> {
    document
        .select(which)
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a date string to `YYYY-MM-DD HH:MM:SS`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc().format(OUTPUT_DATE_FORMAT).to_string());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.format(OUTPUT_DATE_FORMAT).to_string());
        }
    }
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.format(OUTPUT_DATE_FORMAT).to_string())
}

/// `en-US` -> `en`. Only two or three letter primary subtags are accepted.
fn primary_language(raw: &str) -> Option<String> {
    let primary = raw
        .split([',', ';'])
        .next()?
        .trim()
        .split(['-', '_'])
        .next()?
        .to_ascii_lowercase();
    let valid = (2..=3).contains(&primary.len()) && primary.chars().all(|c| c.is_ascii_alphabetic());
    valid.then_some(primary)
}
