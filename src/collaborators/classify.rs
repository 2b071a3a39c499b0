//! Downstream text classifiers.
//!
//! Classifiers run on already extracted article text, after the ingestion
//! stream. A classifier either answers a yes/no question about the text or
//! returns the topic labels that apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Bool(bool),
    Labels(Vec<String>),
}

impl Classification {
    /// Tags to attach to an article. A positive yes/no answer is tagged with
    /// the question itself.
    pub fn into_tags(self, question: Option<&str>) -> Vec<String> {
        match self {
            Classification::Bool(true) => question.map(|q| vec![q.to_string()]).unwrap_or_default(),
            Classification::Bool(false) => Vec::new(),
            Classification::Labels(labels) => labels,
        }
    }
}

pub trait Classifier: Send + Sync {
    /// Without a question, list matching labels. With one, answer whether
    /// the text is about it.
    fn classify(&self, text: &str, question: Option<&str>) -> Classification;
}

/// Keywords per topic, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicKeywords(pub BTreeMap<String, Vec<String>>);

impl Default for TopicKeywords {
    fn default() -> Self {
        let topics: [(&str, &[&str]); 8] = [
            ("Business", &["company", "market", "shares", "revenue", "ceo"]),
            ("Environment", &["climate", "flood", "wildfire", "pollution", "drought", "emissions"]),
            ("Health", &["hospital", "disease", "vaccine", "patients", "virus"]),
            ("Politics", &["election", "parliament", "senate", "minister", "campaign"]),
            ("Science", &["research", "scientists", "study", "laboratory"]),
            ("Sports", &["match", "league", "tournament", "championship", "coach"]),
            ("Technology", &["software", "startup", "smartphone", "artificial intelligence"]),
            ("Law & Crime", &["court", "police", "trial", "judge", "arrested"]),
        ];
        Self(
            topics
                .iter()
                .map(|(topic, words)| {
                    (topic.to_string(), words.iter().map(|w| w.to_string()).collect())
                })
                .collect(),
        )
    }
}

/// Labels a text with every topic whose keywords occur at least `min_hits` times.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    topics: TopicKeywords,
    min_hits: usize,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(TopicKeywords::default(), 2)
    }
}

impl KeywordClassifier {
    pub fn new(topics: TopicKeywords, min_hits: usize) -> Self {
        let lowered = topics
            .0
            .into_iter()
            .map(|(topic, words)| {
                let words = words.into_iter().map(|w| w.to_lowercase()).collect();
                (topic, words)
            })
            .collect();
        Self {
            topics: TopicKeywords(lowered),
            min_hits: min_hits.max(1),
        }
    }

    fn labels(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        self.topics
            .0
            .iter()
            .filter(|(_, words)| {
                let hits: usize = words.iter().map(|w| text.matches(w.as_str()).count()).sum();
                hits >= self.min_hits
            })
            .map(|(topic, _)| topic.clone())
            .collect()
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str, question: Option<&str>) -> Classification {
        let labels = self.labels(text);
        match question {
            None => Classification::Labels(labels),
            Some(q) => Classification::Bool(labels.iter().any(|l| l.eq_ignore_ascii_case(q.trim()))),
        }
    }
}
