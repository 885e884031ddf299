//! In-process sink.

use std::sync::Mutex;

use super::ArtifactSink;
use crate::artifact::Artifact;
use crate::error::{Result, SinkError};

/// Keeps artifacts in memory, in ingestion order.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<Artifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of the stored artifacts.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.lock().clone()
    }

    /// Names of the stored artifacts.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|a| a.name.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Artifact>> {
        // A panic while holding the lock cannot leave the Vec half-updated
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArtifactSink for MemorySink {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn ingest(&self, artifact: Artifact) -> Result<()> {
        let mut artifacts = self.lock();
        if artifacts.iter().any(|a| a.name == artifact.name) {
            return Err(SinkError::Duplicate(artifact.name.to_string()).into());
        }
        artifacts.push(artifact);
        Ok(())
    }
}
