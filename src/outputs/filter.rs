//! Language and topic filtering applied to articles before they are written.

use tracing::{debug, warn};

use crate::cli::Cli;
use crate::collaborators::{Classifier, KeywordClassifier};
use crate::config::IngestConfig;
use crate::models::ArticleRecord;

/// Keyword hits a topic needs before it is attached to an article.
const MIN_TOPIC_HITS: usize = 2;

/// Drops articles in unwanted languages or off the requested topic, and
/// fills `tags` when a classifier is set.
pub struct ArticleFilter {
    languages: Vec<String>,
    classifier: Option<Box<dyn Classifier>>,
    topic: Option<String>,
}

impl ArticleFilter {
    /// Keep articles whose language is one of `languages` (any language when empty).
    pub fn new(languages: &[String]) -> Self {
        Self {
            languages: languages.iter().map(|l| l.trim().to_ascii_lowercase()).collect(),
            classifier: None,
            topic: None,
        }
    }

    /// Tag articles with `classifier`. With a `topic`, only on-topic
    /// articles are kept and tagged with the topic.
    pub fn with_classifier(mut self, classifier: impl Classifier + 'static, topic: Option<String>) -> Self {
        self.classifier = Some(Box::new(classifier));
        self.topic = topic;
        self
    }

    /// Filter described by `--language`, `--classify` and `--topic`.
    pub fn from_cli(args: &Cli, config: &IngestConfig) -> Self {
        let filter = Self::new(&args.languages);
        if !args.classify && args.topic.is_none() {
            return filter;
        }
        if args.topic.is_some() && config.topics.is_none() {
            warn!("No topics configured; using the built-in keyword lists");
        }
        let classifier = KeywordClassifier::new(config.topics.clone().unwrap_or_default(), MIN_TOPIC_HITS);
        filter.with_classifier(classifier, args.topic.clone())
    }

    /// The article to write, or `None` when it is filtered out.
    pub fn apply(&self, mut article: ArticleRecord) -> Option<ArticleRecord> {
        if !self.languages.is_empty() {
            let language = article.language.as_deref().unwrap_or_default();
            if !self.languages.iter().any(|l| l == language) {
                debug!(url = %article.url, language, "Skipping article in another language");
                return None;
            }
        }

        if let Some(classifier) = &self.classifier {
            let topic = self.topic.as_deref();
            let tags = classifier.classify(&article.maintext, topic).into_tags(topic);
            if topic.is_some() && tags.is_empty() {
                debug!(url = %article.url, "Skipping off-topic article");
                return None;
            }
            article.tags = tags;
        }
        Some(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Classification;
    use crate::collaborators::classify::TopicKeywords;
    use clap::Parser;
    use std::collections::BTreeMap;

    const FLOOD: &str = "Flood waters rose again as climate researchers warned of worse floods.";
    const MATCH: &str = "The league match ended late after the coach was sent off.";

    fn article(language: Option<&str>, maintext: &str) -> ArticleRecord {
        ArticleRecord {
            url: "https://example.com/2024/08/story".to_string(),
            title: Some("Story".to_string()),
            maintext: maintext.to_string(),
            date_publish: None,
            language: language.map(str::to_string),
            source_domain: Some("example.com".to_string()),
            crawl_index: "CC-MAIN-2024-33".to_string(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_language_match() {
        let filter = ArticleFilter::new(&["EN".to_string(), "de".to_string()]);
        assert!(filter.apply(article(Some("en"), FLOOD)).is_some());
        assert!(filter.apply(article(Some("de"), FLOOD)).is_some());
        assert!(filter.apply(article(Some("fr"), FLOOD)).is_none());
        assert!(filter.apply(article(None, FLOOD)).is_none());
    }

    #[test]
    fn test_no_filters_pass_everything_untagged() {
        let filter = ArticleFilter::new(&[]);
        let kept = filter.apply(article(None, FLOOD)).unwrap();
        assert!(kept.tags.is_empty());
    }

    #[test]
    fn test_off_topic_dropped() {
        let filter = ArticleFilter::new(&[])
            .with_classifier(KeywordClassifier::default(), Some("Environment".to_string()));

        let kept = filter.apply(article(Some("en"), FLOOD)).unwrap();
        assert_eq!(kept.tags, vec!["Environment"]);
        assert!(filter.apply(article(Some("en"), MATCH)).is_none());
    }

    #[test]
    fn test_labels_become_tags() {
        let filter = ArticleFilter::new(&[]).with_classifier(KeywordClassifier::default(), None);

        assert_eq!(filter.apply(article(None, FLOOD)).unwrap().tags, vec!["Environment"]);
        assert_eq!(filter.apply(article(None, MATCH)).unwrap().tags, vec!["Sports"]);
        assert!(filter.apply(article(None, "Nothing to see.")).unwrap().tags.is_empty());
    }

    #[test]
    fn test_language_checked_before_classifying() {
        struct Panicking;
        impl Classifier for Panicking {
            fn classify(&self, _text: &str, _question: Option<&str>) -> Classification {
                panic!("classified a filtered article")
            }
        }
        let filter = ArticleFilter::new(&["en".to_string()]).with_classifier(Panicking, None);
        assert!(filter.apply(article(Some("fr"), FLOOD)).is_none());
    }

    #[test]
    fn test_from_cli_uses_configured_topics() {
        let mut topics = BTreeMap::new();
        topics.insert("Weather".to_string(), vec!["flood".to_string(), "climate".to_string()]);
        let config = IngestConfig {
            topics: Some(TopicKeywords(topics)),
            ..IngestConfig::default()
        };

        let args = Cli::parse_from(["cc_news_ingest", "-l", "en", "--topic", "Weather"]);
        let filter = ArticleFilter::from_cli(&args, &config);
        assert_eq!(filter.apply(article(Some("en"), FLOOD)).unwrap().tags, vec!["Weather"]);
        assert!(filter.apply(article(Some("en"), MATCH)).is_none());

        let plain = ArticleFilter::from_cli(&Cli::parse_from(["cc_news_ingest"]), &config);
        assert!(plain.apply(article(None, FLOOD)).unwrap().tags.is_empty());
    }
}
