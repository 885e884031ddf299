//! Pre-flight credential and sink validation.
//!
//! Before a run touches every device, a sample of devices is probed with
//! `open` + a no-op command + `close`, and the artifact sink is probed
//! separately. Any failure clears the run's credentials.

use std::fmt;

use futures_util::StreamExt;
use futures_util::stream;
use indexmap::IndexSet;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::credentials::CredentialSet;
use crate::driver::{ConnectTarget, ConnectionProfile, Connector, StepGuard, VendorDriver};
use crate::error::Result;
use crate::inventory::{DeviceRecord, Inventory};
use crate::platform::PlatformSet;
use crate::result::{Failure, FailureKind, Phase};
use crate::sink::ArtifactSink;

/// Which devices the validator probes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// The first device of each vendor kind, in inventory order.
    #[default]
    PerVendor,
    /// Every device.
    All,
    /// An explicit list of device ids.
    Devices { ids: Vec<String> },
}

impl SamplingPolicy {
    /// Select devices to probe. Ids missing from the inventory are returned
    /// separately.
    pub fn sample<'a>(&self, inventory: &'a Inventory) -> (Vec<&'a DeviceRecord>, Vec<String>) {
        match self {
            Self::PerVendor => {
                let mut seen = Vec::new();
                let devices = inventory
                    .iter()
                    .filter(|d| {
                        if seen.contains(&d.vendor_kind) {
                            false
                        } else {
                            seen.push(d.vendor_kind);
                            true
                        }
                    })
                    .collect();
                (devices, Vec::new())
            }
            Self::All => (inventory.iter().collect(), Vec::new()),
            Self::Devices { ids } => {
                let mut devices = Vec::new();
                let mut unknown = Vec::new();
                for id in ids {
                    match inventory.get(id) {
                        Some(device) => devices.push(device),
                        None => unknown.push(id.clone()),
                    }
                }
                (devices, unknown)
            }
        }
    }
}

/// Subject of a failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckTarget {
    Device(String),
    Sink(String),
}

impl fmt::Display for CheckTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(id) => write!(f, "device {}", id),
            Self::Sink(name) => write!(f, "sink {}", name),
        }
    }
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub target: CheckTarget,
    pub kind: FailureKind,
    pub reason: String,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.target, self.kind, self.reason)
    }
}

/// Outcome of the pre-flight checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Devices that were probed, in probe order.
    pub checked_device_ids: IndexSet<String>,

    /// Whether the sink check ran.
    pub sink_checked: bool,

    /// True iff every check passed.
    pub all_passed: bool,

    /// Failed checks: device checks in sample order, then the sink check.
    pub failures: Vec<CheckFailure>,
}

impl ValidationReport {
    /// Failures of device checks.
    pub fn device_failures(&self) -> impl Iterator<Item = &CheckFailure> {
        self.failures
            .iter()
            .filter(|f| matches!(f.target, CheckTarget::Device(_)))
    }

    /// The sink check failure, if any.
    pub fn sink_failure(&self) -> Option<&CheckFailure> {
        self.failures
            .iter()
            .find(|f| matches!(f.target, CheckTarget::Sink(_)))
    }
}

/// Probes credentials and the sink before a run.
pub struct CredentialValidator<'a, C> {
    inventory: &'a Inventory,
    connector: &'a C,
    platforms: &'a PlatformSet,
    config: &'a RunConfig,
}

impl<'a, C: Connector> CredentialValidator<'a, C> {
    pub fn new(
        inventory: &'a Inventory,
        connector: &'a C,
        platforms: &'a PlatformSet,
        config: &'a RunConfig,
    ) -> Self {
        Self {
            inventory,
            connector,
            platforms,
            config,
        }
    }

    /// Run every check. On any failure the credential set is cleared.
    pub async fn validate<S: ArtifactSink>(
        &self,
        credentials: &mut CredentialSet,
        sink: &S,
        cancel: &CancellationToken,
    ) -> ValidationReport {
        let (sampled, unknown) = self.config.sampling.sample(self.inventory);
        let mut report = ValidationReport {
            checked_device_ids: sampled.iter().map(|d| d.id.clone()).collect(),
            sink_checked: true,
            ..Default::default()
        };
        debug!(
            "Validating {} device(s) and sink {}",
            sampled.len(),
            sink.describe()
        );

        for id in unknown {
            report.failures.push(CheckFailure {
                target: CheckTarget::Device(id),
                kind: FailureKind::Validation,
                reason: "not in the inventory".to_string(),
            });
        }

        let probes = {
            let credentials = &*credentials;
            stream::iter(sampled)
                .map(move |device| async move {
                    self.probe_device(device, credentials, cancel)
                        .await
                        .err()
                        .map(|failure| CheckFailure {
                            target: CheckTarget::Device(device.id.clone()),
                            kind: failure.kind,
                            reason: failure.detail,
                        })
                })
                .buffered(self.config.max_in_flight.max(1))
                .collect::<Vec<_>>()
        };
        let (device_failures, sink_result) = tokio::join!(probes, sink.probe());

        report.failures.extend(device_failures.into_iter().flatten());
        if let Err(e) = sink_result {
            report.failures.push(CheckFailure {
                target: CheckTarget::Sink(sink.describe()),
                kind: FailureKind::classify(&e, Phase::Open),
                reason: e.to_string(),
            });
        }

        report.all_passed = report.failures.is_empty();
        if report.all_passed {
            info!("Validation passed ({} device(s) probed)", report.checked_device_ids.len());
        } else {
            for failure in &report.failures {
                warn!("Validation failed: {}", failure);
            }
            credentials.clear();
        }
        report
    }

    async fn probe_device(
        &self,
        device: &DeviceRecord,
        credentials: &CredentialSet,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Failure> {
        let profile = ConnectionProfile::derive(device, &self.config.timeouts);
        let credential = match credentials.resolve(&profile.credential_ref) {
            Some(credential) if credential.is_blank() => {
                return Err(Failure::new(
                    FailureKind::Validation,
                    format!("credential '{}' has an empty password", profile.credential_ref),
                ));
            }
            Some(credential) => credential,
            None => {
                return Err(Failure::new(
                    FailureKind::Validation,
                    format!("no credential for domain '{}'", profile.credential_ref),
                ));
            }
        };

        let platform = self.platforms.get(device.vendor_kind);
        let driver = VendorDriver::new(platform.clone());
        let step = StepGuard::new(profile.timeout(), self.config.cancel_grace, cancel);
        let target = ConnectTarget {
            device,
            credential,
            platform,
            timeout: profile.timeout(),
        };

        let mut session = driver
            .open(self.connector, target, &step)
            .await
            .map_err(|e| Failure::from_error(&e, Phase::Open))?;
        let probed: Result<()> = driver.probe(&mut session, &step).await;
        driver.close(&mut session, &device.id, profile.timeout()).await;
        probed.map_err(|e| Failure::from_error(&e, Phase::Fetch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use crate::inventory::VendorKind;
    use crate::testing::{ConnectReply, FlakySink, ScriptedConnector};

    fn inventory() -> Inventory {
        Inventory::new([
            DeviceRecord::new("CORE-SW-01", "10.0.0.10", VendorKind::SwitchOs),
            DeviceRecord::new("DIST-SW-01", "10.0.0.12", VendorKind::SwitchOs),
            DeviceRecord::new("ISE-PRIMARY", "10.0.0.20", VendorKind::SlowApplianceOs)
                .with_credential("appliance"),
            DeviceRecord::new("ASA-FW-01", "10.0.0.30", VendorKind::FirewallMultiContext)
                .with_contexts(["DMZ"]),
        ])
        .unwrap()
    }

    fn credentials() -> CredentialSet {
        CredentialSet::new()
            .with("default", Credential::new("netops", "pw"))
            .with("appliance", Credential::new("admin", "pw2"))
    }

    async fn validate(
        connector: &ScriptedConnector,
        config: &RunConfig,
        credentials: &mut CredentialSet,
        sink: &FlakySink,
    ) -> ValidationReport {
        let inventory = inventory();
        let platforms = PlatformSet::builtin().unwrap();
        CredentialValidator::new(&inventory, connector, &platforms, config)
            .validate(credentials, sink, &CancellationToken::new())
            .await
    }

    #[test]
    fn test_per_vendor_sampling() {
        let inventory = inventory();
        let (sampled, unknown) = SamplingPolicy::PerVendor.sample(&inventory);
        let ids: Vec<_> = sampled.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["CORE-SW-01", "ISE-PRIMARY", "ASA-FW-01"]);
        assert!(unknown.is_empty());

        let (sampled, unknown) = SamplingPolicy::Devices {
            ids: vec!["DIST-SW-01".to_string(), "GHOST".to_string()],
        }
        .sample(&inventory);
        assert_eq!(sampled.len(), 1);
        assert_eq!(unknown, vec!["GHOST"]);

        assert_eq!(SamplingPolicy::All.sample(&inventory).0.len(), 4);
    }

    #[tokio::test]
    async fn test_all_probes_pass() {
        let connector = ScriptedConnector::new();
        let mut credentials = credentials();
        let report = validate(
            &connector,
            &RunConfig::default(),
            &mut credentials,
            &FlakySink::new(),
        )
        .await;

        assert!(report.all_passed);
        assert!(report.sink_checked);
        assert_eq!(report.checked_device_ids.len(), 3);
        assert!(!credentials.is_empty());
        assert!(connector.all_closed());
        assert_eq!(connector.commands("CORE-SW-01"), vec![""]);
    }

    #[tokio::test]
    async fn test_rejected_login_clears_credentials() {
        let connector = ScriptedConnector::new().on_connect("ISE-PRIMARY", ConnectReply::Reject);
        let mut credentials = credentials();
        let report = validate(
            &connector,
            &RunConfig::default(),
            &mut credentials,
            &FlakySink::new(),
        )
        .await;

        assert!(!report.all_passed);
        let failures: Vec<_> = report.device_failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].target,
            CheckTarget::Device("ISE-PRIMARY".to_string())
        );
        assert_eq!(failures[0].kind, FailureKind::Connect);
        assert!(report.sink_failure().is_none());
        assert!(credentials.is_empty());
    }

    #[tokio::test]
    async fn test_blank_secret_fails_without_connecting() {
        let connector = ScriptedConnector::new();
        let mut credentials = CredentialSet::new()
            .with("default", Credential::new("netops", "pw"))
            .with("appliance", Credential::new("admin", ""));
        let report = validate(
            &connector,
            &RunConfig::default(),
            &mut credentials,
            &FlakySink::new(),
        )
        .await;

        assert!(!report.all_passed);
        assert_eq!(report.failures[0].kind, FailureKind::Validation);
        assert!(!connector.connects().contains(&"ISE-PRIMARY".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_sink_reported_separately() {
        let connector = ScriptedConnector::new();
        let mut credentials = credentials();
        let report = validate(
            &connector,
            &RunConfig::default(),
            &mut credentials,
            &FlakySink::new().unreachable(),
        )
        .await;

        assert!(!report.all_passed);
        assert_eq!(report.device_failures().count(), 0);
        let sink = report.sink_failure().unwrap();
        assert_eq!(sink.kind, FailureKind::Sink);
        assert!(matches!(sink.target, CheckTarget::Sink(_)));
        assert!(credentials.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_pool_bound_still_validates() {
        let connector = ScriptedConnector::new();
        let mut config = RunConfig::default();
        config.max_in_flight = 0;

        let report = tokio::time::timeout(
            std::time::Duration::from_secs(60),
            validate(&connector, &config, &mut credentials(), &FlakySink::new()),
        )
        .await
        .expect("validation finished");

        assert!(report.all_passed);
        assert_eq!(report.checked_device_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_sampled_id_fails_validation() {
        let connector = ScriptedConnector::new();
        let config = RunConfig::default().sampling(SamplingPolicy::Devices {
            ids: vec!["GHOST".to_string()],
        });
        let report = validate(
            &connector,
            &config,
            &mut credentials(),
            &FlakySink::new(),
        )
        .await;

        assert!(!report.all_passed);
        assert_eq!(
            report.failures[0].target,
            CheckTarget::Device("GHOST".to_string())
        );
        assert!(connector.connects().is_empty());
    }
}
