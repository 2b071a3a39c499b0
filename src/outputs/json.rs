//! JSON Lines output of article records.
//!
//! One [`ArticleRecord`] per line. Files are opened in append mode so a
//! resumed run continues the same output file.

use std::error::Error;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use crate::models::ArticleRecord;

/// Buffered JSONL writer to a file or stdout.
pub struct JsonlSink {
    writer: BufWriter<Box<dyn AsyncWrite + Unpin + Send>>,
    written: usize,
}

impl JsonlSink {
    /// Append to `path`, or write to stdout when `path` is `None`.
    #[instrument(level = "info", skip_all)]
    pub async fn open(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let inner: Box<dyn AsyncWrite + Unpin + Send> = match path {
            Some(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                info!(path = %path.display(), "Appending articles");
                Box::new(file)
            }
            None => Box::new(tokio::io::stdout()),
        };
        Ok(Self::from_writer(inner))
    }

    pub fn from_writer(inner: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        Self {
            writer: BufWriter::new(inner),
            written: 0,
        }
    }

    pub async fn write(&mut self, article: &ArticleRecord) -> Result<(), Box<dyn Error>> {
        let mut line = serde_json::to_vec(article)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.written += 1;
        debug!(url = %article.url, written = self.written, "Wrote article");
        Ok(())
    }

    /// Flush buffered lines. Called before every checkpoint is persisted so
    /// the state file never runs ahead of the output.
    pub async fn flush(&mut self) -> Result<(), Box<dyn Error>> {
        self.writer.flush().await?;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }
}
