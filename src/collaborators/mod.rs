//! Pluggable collaborators invoked by the archive record stream.
//!
//! The core only depends on the traits below. Each submodule ships a default
//! implementation:
//!
//! | Trait | Default | Module |
//! |-------|---------|--------|
//! | [`ComplianceChecker`] | [`HeaderOptOut`] | [`compliance`] |
//! | [`Extractor`] | [`HtmlExtractor`] | [`extract`] |
//! | [`LanguageDetector`] | [`WhatlangDetector`] | [`language`] |
//! | [`Classifier`] | [`KeywordClassifier`] | [`classify`] |
//!
//! Classifiers are not part of the ingestion stream; they run downstream on
//! already extracted text.

use std::sync::Arc;

use crate::error::IngestError;
use crate::models::HttpHeaders;
use crate::warc::ArchiveEntry;

pub mod classify;
pub mod compliance;
pub mod extract;
pub mod language;

pub use classify::{Classification, Classifier, KeywordClassifier};
pub use compliance::HeaderOptOut;
pub use extract::HtmlExtractor;
pub use language::WhatlangDetector;

/// Decides whether a captured page may be used, from its HTTP headers.
pub trait ComplianceChecker: Send + Sync {
    fn is_allowed(&self, headers: &HttpHeaders) -> bool;
}

/// Fields pulled out of a captured page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub maintext: Option<String>,
    pub date_publish: Option<String>,
    pub language: Option<String>,
    pub url: Option<String>,
}

/// Turns an archive entry into article fields.
pub trait Extractor: Send + Sync {
    fn extract(&self, entry: &ArchiveEntry) -> Result<ExtractedArticle, IngestError>;
}

/// Guesses the language of a text, returning a language code.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Result<String, IngestError>;
}

/// The collaborators used by one pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub compliance: Arc<dyn ComplianceChecker>,
    pub extractor: Arc<dyn Extractor>,
    pub detector: Arc<dyn LanguageDetector>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            compliance: Arc::new(HeaderOptOut::default()),
            extractor: Arc::new(HtmlExtractor::default()),
            detector: Arc::new(WhatlangDetector),
        }
    }
}
