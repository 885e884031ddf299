//! Session orchestrator: validates, then runs every device of the inventory.
//!
//! ```text
//! Idle -> Validating -> Aborted
//!                    -> Running -> Completed
//! ```
//!
//! Each device is an independent unit of work (open, fetch, close) scheduled
//! on a bounded pool. Every (device, context) pair ends with exactly one
//! [`SessionResult`]; artifacts go to the sink as soon as each unit
//! completes. There is a single attempt per unit; retries are left to the
//! caller.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::artifact::{Artifact, ArtifactName, RunStamp};
use crate::config::RunConfig;
use crate::credentials::CredentialSet;
use crate::driver::{
    ConnectTarget, ConnectionProfile, Connector, FetchedUnit, StepGuard, VendorDriver,
};
use crate::error::Result;
use crate::inventory::{DeviceRecord, Inventory, RetrievalUnit};
use crate::platform::PlatformSet;
use crate::result::{Failure, FailureKind, Outcome, Phase, SessionResult};
use crate::sink::ArtifactSink;
use crate::validator::{CredentialValidator, ValidationReport};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Validating,
    Aborted,
    Running,
    Completed,
}

/// Per-run inputs that are not part of the static configuration.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Credentials for this run; cleared if validation fails.
    pub credentials: CredentialSet,

    /// Cooperative cancellation signal.
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(credentials: CredentialSet) -> Self {
        Self {
            credentials,
            cancel: CancellationToken::new(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// States visited, in order.
    pub states: Vec<RunState>,

    /// Pre-flight validation outcome.
    pub validation: ValidationReport,

    /// One result per (device, context), in inventory order.
    pub results: Vec<SessionResult>,

    /// Every device of the run, in inventory order. Empty when aborted.
    pub devices: Vec<DeviceRun>,

    /// Timestamp used in this run's artifact names.
    pub stamp: RunStamp,
}

impl RunReport {
    /// The terminal state.
    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    /// End-of-run summary.
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_report(self)
    }
}

/// Whether a device got its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRun {
    pub device_id: String,
    pub display_name: String,

    /// False when the run was cancelled before the device was reached.
    pub started: bool,
}

/// Vendor-polymorphic retrieval over an inventory.
pub struct Orchestrator<C> {
    inventory: Inventory,
    connector: C,
    config: RunConfig,
    platforms: PlatformSet,
}

impl<C: Connector> Orchestrator<C> {
    /// Resolve platform definitions and build the orchestrator.
    pub fn new(inventory: Inventory, connector: C, config: RunConfig) -> Result<Self> {
        let platforms = PlatformSet::resolve(&config.vendors)?;
        Ok(Self {
            inventory,
            connector,
            config,
            platforms,
        })
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Validate, then retrieve every device.
    pub async fn run<S: ArtifactSink>(&self, ctx: &mut RunContext, sink: &S) -> RunReport {
        self.run_at(ctx, sink, RunStamp::now()).await
    }

    /// [`run`](Self::run) with an explicit artifact timestamp.
    pub async fn run_at<S: ArtifactSink>(
        &self,
        ctx: &mut RunContext,
        sink: &S,
        stamp: RunStamp,
    ) -> RunReport {
        let mut states = vec![RunState::Idle, RunState::Validating];

        let validation =
            CredentialValidator::new(&self.inventory, &self.connector, &self.platforms, &self.config)
                .validate(&mut ctx.credentials, sink, &ctx.cancel)
                .await;

        if !validation.all_passed {
            states.push(RunState::Aborted);
            warn!(
                "Run aborted: {} validation check(s) failed",
                validation.failures.len()
            );
            return RunReport {
                states,
                validation,
                results: Vec::new(),
                devices: Vec::new(),
                stamp,
            };
        }

        states.push(RunState::Running);
        info!(
            "Running {} device(s), at most {} at a time",
            self.inventory.len(),
            self.config.max_in_flight
        );

        let ledger = Mutex::new(HashSet::new());
        let credentials = &ctx.credentials;
        let cancel = &ctx.cancel;
        let ledger = &ledger;
        let mut per_device: Vec<(usize, DeviceRun, Vec<SessionResult>)> =
            stream::iter(self.inventory.iter().enumerate())
                .map(|(index, device)| async move {
                    let (started, results) = self
                        .process_device(device, credentials, cancel, sink, stamp, ledger)
                        .await;
                    let run = DeviceRun {
                        device_id: device.id.clone(),
                        display_name: device.display_name.clone(),
                        started,
                    };
                    (index, run, results)
                })
                .buffer_unordered(self.config.max_in_flight.max(1))
                .collect()
                .await;
        per_device.sort_by_key(|(index, _, _)| *index);

        let mut devices = Vec::with_capacity(per_device.len());
        let mut results = Vec::new();
        for (_, run, device_results) in per_device {
            devices.push(run);
            results.extend(device_results);
        }

        states.push(RunState::Completed);
        RunReport {
            states,
            validation,
            results,
            devices,
            stamp,
        }
    }

    async fn process_device<S: ArtifactSink>(
        &self,
        device: &DeviceRecord,
        credentials: &CredentialSet,
        cancel: &CancellationToken,
        sink: &S,
        stamp: RunStamp,
        ledger: &Mutex<HashSet<ArtifactName>>,
    ) -> (bool, Vec<SessionResult>) {
        if cancel.is_cancelled() {
            debug!("{}: not started, run cancelled", device.id);
            let results = fail_all(
                device,
                &Failure::new(FailureKind::Cancelled, "run cancelled before the session started"),
                Duration::ZERO,
            );
            return (false, results);
        }

        (
            true,
            self.run_device(device, credentials, cancel, sink, stamp, ledger)
                .await,
        )
    }

    async fn run_device<S: ArtifactSink>(
        &self,
        device: &DeviceRecord,
        credentials: &CredentialSet,
        cancel: &CancellationToken,
        sink: &S,
        stamp: RunStamp,
        ledger: &Mutex<HashSet<ArtifactName>>,
    ) -> Vec<SessionResult> {

        let profile = ConnectionProfile::derive(device, &self.config.timeouts);
        let Some(credential) = credentials.resolve(&profile.credential_ref) else {
            return fail_all(
                device,
                &Failure::new(
                    FailureKind::Connect,
                    format!("no credential for domain '{}'", profile.credential_ref),
                ),
                Duration::ZERO,
            );
        };

        let platform = self.platforms.get(device.vendor_kind);
        let driver = VendorDriver::new(platform.clone());
        let timeout = profile.timeout();
        let step = StepGuard::new(timeout, self.config.cancel_grace, cancel);
        let target = ConnectTarget {
            device,
            credential,
            platform,
            timeout,
        };

        let started = Instant::now();
        let mut session = match driver.open(&self.connector, target, &step).await {
            Ok(session) => session,
            Err(e) => {
                return fail_all(device, &Failure::from_error(&e, Phase::Open), started.elapsed());
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<FetchedUnit>();
        let producer = async {
            driver.fetch(&mut session, device, &step, tx).await;
            driver.close(&mut session, &device.id, timeout).await;
        };
        let consumer = async {
            let mut results = Vec::new();
            while let Some(fetched) = rx.recv().await {
                results.push(self.deliver(device, fetched, sink, stamp, ledger).await);
            }
            results
        };
        let ((), results) = tokio::join!(producer, consumer);
        results
    }

    async fn deliver<S: ArtifactSink>(
        &self,
        device: &DeviceRecord,
        fetched: FetchedUnit,
        sink: &S,
        stamp: RunStamp,
        ledger: &Mutex<HashSet<ArtifactName>>,
    ) -> SessionResult {
        let FetchedUnit {
            unit,
            output,
            duration,
        } = fetched;

        let outcome = match output {
            Ok(bytes) => {
                let name = stamp.artifact_name(&device.id, &unit);
                if claim(ledger, &name) {
                    let size = bytes.len();
                    match sink.ingest(Artifact::new(name.clone(), bytes)).await {
                        Ok(()) => Outcome::Success {
                            artifact: name,
                            size,
                        },
                        Err(e) => Outcome::Failure(Failure::new(FailureKind::Sink, e.to_string())),
                    }
                } else {
                    error!("{}: artifact name {} already used in this run", device.id, name);
                    Outcome::Failure(Failure::new(
                        FailureKind::Sink,
                        format!("artifact {} already ingested", name),
                    ))
                }
            }
            Err(failure) => Outcome::Failure(failure),
        };

        let result = SessionResult::new(&device.id, label(&unit), outcome, duration);
        result.log();
        result
    }
}

fn label(unit: &RetrievalUnit) -> Option<String> {
    unit.label().map(str::to_string)
}

fn claim(ledger: &Mutex<HashSet<ArtifactName>>, name: &ArtifactName) -> bool {
    ledger
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(name.clone())
}

fn fail_all(device: &DeviceRecord, failure: &Failure, duration: Duration) -> Vec<SessionResult> {
    device
        .units()
        .iter()
        .map(|unit| {
            let result = SessionResult::new(
                &device.id,
                label(unit),
                Outcome::Failure(failure.clone()),
                duration,
            );
            result.log();
            result
        })
        .collect()
}

/// Operator-facing account of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub state: RunState,

    /// Devices whose session was started.
    pub devices_attempted: usize,

    /// Devices whose every unit succeeded.
    pub devices_succeeded: usize,

    /// Devices with at least one failed unit.
    pub devices_failed: usize,

    /// Failed units of attempted devices.
    pub failures: Vec<FailedUnit>,

    /// Devices the run was cancelled before reaching, as display labels.
    pub not_started: Vec<String>,

    /// Artifacts the sink accepted.
    pub artifacts_delivered: usize,

    /// Whether every retrieved artifact reached the sink.
    pub sink_received_all: bool,

    /// Validation failures when the run was aborted.
    pub validation_failures: Vec<String>,
}

impl RunSummary {
    fn from_report(report: &RunReport) -> Self {
        let mut failed: HashSet<&str> = HashSet::new();
        let mut failures = Vec::new();
        let mut artifacts_delivered = 0;
        let mut sink_received_all = true;

        let started: HashSet<&str> = report
            .devices
            .iter()
            .filter(|d| d.started)
            .map(|d| d.device_id.as_str())
            .collect();

        for result in &report.results {
            if !started.contains(result.device_id.as_str()) {
                continue;
            }
            match result.outcome {
                Outcome::Success { .. } => artifacts_delivered += 1,
                Outcome::Failure(ref failure) => {
                    failed.insert(&result.device_id);
                    if failure.kind == FailureKind::Sink {
                        sink_received_all = false;
                    }
                    let display_name = report
                        .devices
                        .iter()
                        .find(|d| d.device_id == result.device_id)
                        .map(|d| d.display_name.clone())
                        .unwrap_or_else(|| result.device_id.clone());
                    failures.push(FailedUnit {
                        device_id: result.device_id.clone(),
                        display_name,
                        context: result.context_name.clone(),
                        failure: failure.clone(),
                    });
                }
            }
        }

        Self {
            state: report.final_state(),
            devices_attempted: started.len(),
            devices_succeeded: started.len() - failed.len(),
            devices_failed: failed.len(),
            failures,
            not_started: report
                .devices
                .iter()
                .filter(|d| !d.started)
                .map(device_label)
                .collect(),
            artifacts_delivered,
            sink_received_all,
            validation_failures: report
                .validation
                .failures
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

/// One failed (device, context) pair in a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUnit {
    pub device_id: String,
    pub display_name: String,
    pub context: Option<String>,
    pub failure: Failure,
}

impl fmt::Display for FailedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", label_of(&self.device_id, &self.display_name))?;
        if let Some(ref context) = self.context {
            write!(f, " [{}]", context)?;
        }
        write!(f, " {}", self.failure)
    }
}

fn device_label(run: &DeviceRun) -> String {
    label_of(&run.device_id, &run.display_name)
}

fn label_of(id: &str, display_name: &str) -> String {
    if id == display_name {
        id.to_string()
    } else {
        format!("{} ({})", id, display_name)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.state == RunState::Aborted {
            writeln!(f, "Run aborted during validation:")?;
            for failure in &self.validation_failures {
                writeln!(f, "  {}", failure)?;
            }
            return Ok(());
        }

        writeln!(
            f,
            "Devices attempted: {}, succeeded: {}, failed: {}",
            self.devices_attempted, self.devices_succeeded, self.devices_failed
        )?;
        for failure in &self.failures {
            writeln!(f, "  {}", failure)?;
        }
        if !self.not_started.is_empty() {
            writeln!(f, "Not started (cancelled): {}", self.not_started.join(", "))?;
        }
        write!(f, "Artifacts delivered: {}", self.artifacts_delivered)?;
        if self.sink_received_all {
            writeln!(f, " (sink received every artifact)")
        } else {
            writeln!(f, " (some artifacts did not reach the sink)")
        }
    }
}
