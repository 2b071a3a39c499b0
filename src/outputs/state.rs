//! Persisted resume cursor.
//!
//! The state file holds the latest checkpoint as JSON. It is replaced
//! atomically (write to a sibling temp file, then rename) so an interrupted
//! run leaves either the old or the new cursor behind.

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::models::ResumeCursor;

/// Read the cursor stored at `path`. A missing file means "start fresh".
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_cursor(path: &Path) -> Result<Option<ResumeCursor>, Box<dyn Error>> {
    match fs::read_to_string(path).await {
        Ok(raw) => {
            let cursor: ResumeCursor = serde_json::from_str(&raw)?;
            info!(
                batch = cursor.batch,
                index = cursor.index.as_deref().unwrap_or(""),
                pattern = cursor.pattern.as_deref().unwrap_or(""),
                "Loaded resume cursor"
            );
            Ok(Some(cursor))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace the cursor stored at `path`.
pub async fn write_cursor(path: &Path, cursor: &ResumeCursor) -> Result<(), Box<dyn Error>> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(cursor)?).await?;
    fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), batch = cursor.batch, "Saved checkpoint");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cursor = read_cursor(&tmp.path().join("state.json")).await.unwrap();
        assert!(cursor.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");

        let first = ResumeCursor::new(1, Some("CC-MAIN-2024-33".into()), Some("example.com".into()));
        let second = ResumeCursor::new(2, Some("CC-MAIN-2023-50".into()), None);
        write_cursor(&path, &first).await.unwrap();
        write_cursor(&path, &second).await.unwrap();

        assert_eq!(read_cursor(&path).await.unwrap(), Some(second));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(read_cursor(&path).await.is_err());
    }
}
