//! Command-line interface definitions.
//!
//! Every flag overrides the matching field of the YAML config file (when one
//! is given). Several flags can also be set through environment variables.

use clap::Parser;
use std::path::PathBuf;

use crate::catalog::Balance;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Two sites, newest indices first, into a file
/// cc_news_ingest -u 'nytimes.com/2020/*/*' -u bbc.co.uk/news/* -o articles.jsonl
///
/// # Resumable run: the cursor is read from and saved to state.json
/// cc_news_ingest -c ingest.yaml --state-file state.json -n 500
///
/// # Resume at an explicit position
/// cc_news_ingest -u example.com --resume-batch 3 --resume-index CC-MAIN-2024-33
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "CC_NEWS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Target pattern `host[/path-glob]`, or `host/~regex` (repeatable)
    #[arg(short = 'u', long = "url", value_name = "PATTERN")]
    pub urls: Vec<String>,

    /// File with one target pattern per line (`#` starts a comment)
    #[arg(long)]
    pub urls_file: Option<PathBuf>,

    /// Index ordering: even, ascending (asc) or descending (desc)
    #[arg(short, long)]
    pub balance: Option<Balance>,

    /// Index records per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Stop after this many articles. With --state-file the run goes on to
    /// the next checkpoint, so the output may hold a few more
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Batch number to resume at
    #[arg(long)]
    pub resume_batch: Option<u64>,

    /// Crawl index id to resume at, e.g. CC-MAIN-2024-33
    #[arg(long)]
    pub resume_index: Option<String>,

    /// Target pattern to resume at
    #[arg(long)]
    pub resume_pattern: Option<String>,

    /// Read the resume cursor from this file and save checkpoints to it
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Append articles to this JSONL file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum in-flight lookups and fetches
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Aggregate requests per second
    #[arg(long, env = "CC_NEWS_RPS")]
    pub rps: Option<u32>,

    /// User agent for all requests
    #[arg(long, env = "CC_NEWS_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Keep scheduling rounds even after a round finds nothing
    #[arg(long)]
    pub no_stop: bool,

    /// Only keep articles in these languages (ISO 639-1, repeatable)
    #[arg(short, long = "language", value_name = "CODE")]
    pub languages: Vec<String>,

    /// Tag articles with topic labels
    #[arg(long)]
    pub classify: bool,

    /// Only keep articles about this topic (implies --classify)
    #[arg(long)]
    pub topic: Option<String>,

    /// Debug level logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "CC_NEWS_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply flag overrides to `config`.
    pub fn apply(&self, config: &mut IngestConfig) -> Result<()> {
        let mut patterns = self.urls.clone();
        if let Some(path) = &self.urls_file {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                IngestError::Config(format!("cannot read {}: {e}", path.display()))
            })?;
            patterns.extend(parse_pattern_lines(&raw));
        }
        if !patterns.is_empty() {
            config.patterns = patterns;
        }

        if let Some(balance) = self.balance {
            config.balance = balance;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(batch) = self.resume_batch {
            config.resume.batch = batch;
        }
        if let Some(index) = &self.resume_index {
            config.resume.index = Some(index.clone());
        }
        if let Some(pattern) = &self.resume_pattern {
            config.resume.pattern = Some(pattern.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.rps.is_some() {
            config.requests_per_second = self.rps;
        }
        if let Some(user_agent) = &self.user_agent {
            config.user_agent = user_agent.clone();
        }
        if self.no_stop {
            config.stop_when_exhausted = false;
        }
        if self.verbose {
            config.verbose = true;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file.clone();
        }
        Ok(())
    }

    /// Whether an explicit resume position was given on the command line.
    pub fn has_resume_flags(&self) -> bool {
        self.resume_batch.is_some() || self.resume_index.is_some() || self.resume_pattern.is_some()
    }
}

/// Patterns from a text file: one per line, blank lines and `#` comments skipped.
pub fn parse_pattern_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "cc_news_ingest",
            "--url",
            "nytimes.com/2020/*/*",
            "--url",
            "bbc.co.uk",
            "--balance",
            "desc",
            "--limit",
            "100",
        ]);

        assert_eq!(cli.urls, vec!["nytimes.com/2020/*/*", "bbc.co.uk"]);
        assert_eq!(cli.balance, Some(Balance::Descending));
        assert_eq!(cli.limit, Some(100));
        assert!(!cli.has_resume_flags());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "cc_news_ingest",
            "-u",
            "example.com",
            "-j",
            "4",
            "-o",
            "/tmp/articles.jsonl",
            "-l",
            "en",
            "-v",
        ]);

        assert_eq!(cli.concurrency, Some(4));
        assert_eq!(cli.output, Some(PathBuf::from("/tmp/articles.jsonl")));
        assert_eq!(cli.languages, vec!["en"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_limit_help_mentions_checkpoint_rounding() {
        let command = <Cli as clap::CommandFactory>::command();
        let limit = command
            .get_arguments()
            .find(|arg| arg.get_id() == "limit")
            .unwrap();
        let help = limit.get_long_help().or(limit.get_help()).unwrap().to_string();
        assert!(help.contains("--state-file"), "{help}");
        assert!(help.contains("next checkpoint"), "{help}");
    }

    #[test]
    fn test_invalid_balance_rejected() {
        let result = Cli::try_parse_from(["cc_news_ingest", "--balance", "random"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_overrides_config() {
        let cli = Cli::parse_from([
            "cc_news_ingest",
            "-u",
            "example.com",
            "--resume-batch",
            "7",
            "--resume-index",
            "CC-MAIN-2024-33",
            "--no-stop",
            "--rps",
            "3",
        ]);
        let mut config = IngestConfig {
            patterns: vec!["from-file.org".to_string()],
            batch_size: 25,
            ..IngestConfig::default()
        };
        cli.apply(&mut config).unwrap();

        assert_eq!(config.patterns, vec!["example.com"]);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.resume.batch, 7);
        assert_eq!(config.resume.index.as_deref(), Some("CC-MAIN-2024-33"));
        assert_eq!(config.resume.pattern, None);
        assert!(!config.stop_when_exhausted);
        assert_eq!(config.requests_per_second, Some(3));
        assert!(cli.has_resume_flags());
    }

    #[test]
    fn test_urls_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# sites\nexample.com\n\nnews.org/2020/*  # archive\n").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::parse_from(["cc_news_ingest", "-u", "first.com", "--urls-file", &path]);
        let mut config = IngestConfig::default();
        cli.apply(&mut config).unwrap();

        assert_eq!(config.patterns, vec!["first.com", "example.com", "news.org/2020/*"]);
    }
}
