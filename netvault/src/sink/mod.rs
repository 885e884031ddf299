//! Artifact sinks: where finished configuration snapshots go.
//!
//! The orchestrator hands every successful artifact to a sink as soon as it
//! is ready, possibly from several device sessions at once. A sink handles
//! its own locking; the orchestrator only guarantees that it never ingests
//! the same artifact name twice in one run.

mod directory;
mod memory;
mod mirror;
mod sftp;

pub use directory::{ARCHIVE_DIR, DirectorySink, STAGING_DIR};
pub use memory::MemorySink;
pub use mirror::MirrorSink;
pub use sftp::{
    BACKUP_CREDENTIAL_DOMAIN, RemoteConnector, RemoteSession, SftpClient, SftpConnector, SftpSettings,
    SftpSink,
};

use std::future::Future;

use crate::artifact::Artifact;
use crate::error::Result;

/// Destination for artifacts.
pub trait ArtifactSink: Send + Sync {
    /// Human-readable name of the endpoint, used in validation reports.
    fn describe(&self) -> String;

    /// Check that the endpoint is reachable and accepts writes.
    fn probe(&self) -> impl Future<Output = Result<()>> + Send;

    /// Store one artifact.
    fn ingest(&self, artifact: Artifact) -> impl Future<Output = Result<()>> + Send;
}
