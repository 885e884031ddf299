//! Local directory sink with a staging area and dated archive.
//!
//! Layout under the sink root:
//!
//! ```text
//! todayBackup/                      artifacts of the current run
//! backupArchive/YYYYmmdd_backup/    staged artifacts moved here by archive_staged()
//! ```

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};

use super::ArtifactSink;
use crate::artifact::{Artifact, RunStamp};
use crate::error::{Result, SinkError};

/// Staging directory name.
pub const STAGING_DIR: &str = "todayBackup";

/// Archive directory name.
pub const ARCHIVE_DIR: &str = "backupArchive";

const PROBE_FILE: &str = ".netvault-probe";

/// Writes artifacts as files into a staging directory.
///
/// Each file is written under a temporary name and renamed into place, so a
/// failed write never leaves a truncated configuration behind.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    ingested: Mutex<HashSet<String>>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ingested: Mutex::new(HashSet::new()),
        }
    }

    /// The staging directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// The archive root.
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    /// Create the staging and archive directories.
    pub async fn prepare(&self) -> Result<()> {
        for dir in [self.staging_dir(), self.archive_dir()] {
            if !tokio::fs::try_exists(&dir).await.map_err(SinkError::Io)? {
                tokio::fs::create_dir_all(&dir).await.map_err(SinkError::Io)?;
                debug!("Created directory {}", dir.display());
            }
        }
        Ok(())
    }

    /// Move every staged artifact into the archive folder of the run day.
    ///
    /// Returns the archive folder and the number of files moved.
    pub async fn archive_staged(&self, stamp: &RunStamp) -> Result<(PathBuf, usize)> {
        let target = self
            .archive_dir()
            .join(format!("{}_backup", stamp.day()));
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(SinkError::Io)?;

        let mut moved = 0;
        let mut entries = tokio::fs::read_dir(self.staging_dir())
            .await
            .map_err(SinkError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(SinkError::Io)? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            tokio::fs::rename(entry.path(), target.join(&name))
                .await
                .map_err(SinkError::Io)?;
            moved += 1;
        }

        info!("Archived {} backup files to {}", moved, target.display());
        Ok((target, moved))
    }

    fn claim(&self, name: &str) -> Result<()> {
        let mut ingested = self
            .ingested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !ingested.insert(name.to_string()) {
            return Err(SinkError::Duplicate(name.to_string()).into());
        }
        Ok(())
    }
}

async fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<()> {
    let tmp = dir.join(format!(".{}.tmp", name));
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, dir.join(name)).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

impl ArtifactSink for DirectorySink {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    async fn probe(&self) -> Result<()> {
        self.prepare()
            .await
            .map_err(|e| SinkError::Unreachable(format!("{}: {}", self.root.display(), e)))?;

        let probe = self.staging_dir().join(PROBE_FILE);
        tokio::fs::write(&probe, b"probe")
            .await
            .map_err(|e| SinkError::Unreachable(format!("{}: {}", probe.display(), e)))?;
        tokio::fs::remove_file(&probe).await.map_err(SinkError::Io)?;
        Ok(())
    }

    async fn ingest(&self, artifact: Artifact) -> Result<()> {
        let name = artifact.name.as_str();
        self.claim(name)?;

        write_atomic(&self.staging_dir(), name, &artifact.bytes)
            .await
            .map_err(|e| SinkError::Ingest {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        debug!("Stored {} ({} bytes)", name, artifact.len());
        Ok(())
    }
}
