//! # Netvault
//!
//! Async multi-vendor network configuration backup.
//!
//! Netvault logs into a declared inventory of network devices over SSH,
//! retrieves their running configuration and hands each snapshot to an
//! artifact sink. A pre-flight validation probes a sample of devices and the
//! sink before the run touches everything.
//!
//! ## Features
//!
//! - Async SSH sessions via russh, with tail-searched prompt detection
//! - Vendor drivers for switch and router CLIs, multi-context firewalls and
//!   slow appliances, with their command sets as overridable data
//! - Bounded concurrency, per-step timeouts and cooperative cancellation
//! - One result per device and context, failures isolated per unit
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netvault::{
//!     ConfigFile, Credential, CredentialSet, DirectorySink, Orchestrator, RunContext,
//!     SshConnector,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netvault::Error> {
//!     let file = ConfigFile::load("netvault.toml".as_ref())?;
//!     let connector = SshConnector::new(file.ssh.clone());
//!     let (inventory, config) = file.into_parts()?;
//!
//!     let orchestrator = Orchestrator::new(inventory, connector, config)?;
//!     let sink = DirectorySink::new("/var/backups/network");
//!     let mut ctx = RunContext::new(
//!         CredentialSet::new().with("default", Credential::new("netops", "secret")),
//!     );
//!
//!     let report = orchestrator.run(&mut ctx, &sink).await;
//!     print!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod channel;
pub mod config;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod inventory;
pub mod orchestrator;
pub mod platform;
pub mod result;
pub mod sink;
pub mod transport;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use artifact::{Artifact, ArtifactName, RunStamp};
pub use config::{ConfigFile, RunConfig, TimeoutPolicy};
pub use credentials::{Credential, CredentialRef, CredentialSet};
pub use driver::{Connector, Session, SshConnector, VendorDriver};
pub use error::{Error, Result};
pub use inventory::{DeviceRecord, Inventory, RetrievalUnit, VendorKind};
pub use orchestrator::{
    DeviceRun, FailedUnit, Orchestrator, RunContext, RunReport, RunState, RunSummary,
};
pub use platform::{PlatformDefinition, PlatformSet, VendorOverride};
pub use result::{Failure, FailureKind, Outcome, RetrievalKind, SessionResult};
pub use sink::{ArtifactSink, DirectorySink, MemorySink, MirrorSink, SftpSettings, SftpSink};
pub use validator::{SamplingPolicy, ValidationReport};
