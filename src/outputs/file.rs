//! Feed file output.
//!
//! A feed is written to a hidden temporary sibling first and then renamed over
//! the target, so readers never observe a truncated document and a failed
//! write leaves the previous feed in place.

use crate::error::FeedError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "feed.xml".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `xml` to `output_dir/file_name`, replacing any previous file.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), file = %file_name))]
pub async fn write_feed(output_dir: &Path, file_name: &str, xml: &str) -> Result<PathBuf, FeedError> {
    let target = output_dir.join(file_name);
    let tmp = temp_sibling(&target);

    if let Err(e) = fs::write(&tmp, xml).await {
        error!(path = %tmp.display(), error = %e, "Failed to write temporary feed file");
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp, &target).await {
        error!(path = %target.display(), error = %e, "Failed to move feed into place");
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    info!(path = %target.display(), bytes = xml.len(), "Wrote feed");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_feed_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_feed(dir.path(), "cm.xml", "<rss/>").await.unwrap();
        assert_eq!(path, dir.path().join("cm.xml"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<rss/>");
    }

    #[tokio::test]
    async fn test_write_feed_replaces_previous_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cm.xml"), "old").unwrap();

        write_feed(dir.path(), "cm.xml", "new").await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("cm.xml")).unwrap(), "new");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cm.xml"]);
    }

    #[tokio::test]
    async fn test_write_feed_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = write_feed(&missing, "cm.xml", "x").await.unwrap_err();
        assert!(matches!(err, FeedError::Io(_)));
    }

    #[test]
    fn test_temp_sibling() {
        assert_eq!(
            temp_sibling(Path::new("/out/cm.xml")),
            PathBuf::from("/out/.cm.xml.tmp")
        );
    }
}
