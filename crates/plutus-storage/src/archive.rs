use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;

/// Raw fetch bodies kept on disk as `<root>/<YYYYmmdd_HHMMSS>/<source>/<sha256>.<ext>`.
#[derive(Debug, Clone)]
pub struct RawArchive {
    root: PathBuf,
}

impl RawArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store `bytes` and return the path relative to the archive root. A body that
    /// is already archived under the same stamp and source is left untouched.
    pub async fn store(
        &self,
        fetched_at: DateTime<Utc>,
        source: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<PathBuf> {
        let hash = hex::encode(Sha256::digest(bytes));
        let ext = match extension.trim_start_matches('.').trim() {
            "" => "bin",
            ext => ext,
        };
        let dir = PathBuf::from(fetched_at.format("%Y%m%d_%H%M%S").to_string()).join(path_safe(source));
        let relative = dir.join(format!("{hash}.{ext}"));
        let target = self.root.join(&relative);
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Ok(relative);
        }

        let parent = self.root.join(&dir);
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating archive directory {}", parent.display()))?;
        let temp = parent.join(format!(".{hash}.tmp"));
        fs::write(&temp, bytes)
            .await
            .with_context(|| format!("writing {}", temp.display()))?;
        if let Err(err) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err).with_context(|| format!("moving archive into {}", target.display()));
        }
        Ok(relative)
    }
}

fn path_safe(source: &str) -> String {
    let cleaned: String = source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "source".to_string()
    } else {
        cleaned
    }
}
