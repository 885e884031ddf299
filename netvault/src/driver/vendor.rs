//! Vendor session drivers.
//!
//! One [`VendorDriver`] per device, resolved once from the platform's
//! vendor kind. It owns the retrieval protocol: which commands run, in what
//! order, how contexts are switched and how long a slow CLI is given to
//! settle. Every retrieval unit of the device is accounted for exactly once.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

use super::profile::ConnectTarget;
use super::response::Response;
use super::step::StepGuard;
use super::{Connector, Session};
use crate::error::{DriverError, Error, PlatformError, Result};
use crate::inventory::{DeviceRecord, RetrievalUnit, VendorKind};
use crate::platform::PlatformDefinition;
use crate::platform::vendors::slow_appliance::DEFAULT_SETTLE_DELAY;
use crate::result::{Failure, FailureKind, Phase, RetrievalKind};

/// Separator between the outputs of consecutive retrieval commands.
const OUTPUT_SEPARATOR: &str = "\n!\n";

/// Vendor-specific retrieval behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverVariant {
    /// One retrieval unit, read as soon as the prompt returns.
    Standard,
    /// System-level unit, then one unit per security context.
    MultiContext,
    /// One retrieval unit; each retrieval command waits `settle` before reading.
    SlowAppliance { settle: Duration },
}

/// Output of one retrieval unit, as it becomes ready.
#[derive(Debug)]
pub struct FetchedUnit {
    pub unit: RetrievalUnit,
    pub output: std::result::Result<Bytes, Failure>,
    pub duration: Duration,
}

/// Runs the vendor retrieval protocol over a [`Session`].
#[derive(Debug, Clone)]
pub struct VendorDriver {
    variant: DriverVariant,
    platform: Arc<PlatformDefinition>,
}

impl VendorDriver {
    /// Resolve the driver for a platform.
    pub fn new(platform: Arc<PlatformDefinition>) -> Self {
        let variant = match platform.vendor_kind {
            VendorKind::SwitchOs | VendorKind::RouterOs => DriverVariant::Standard,
            VendorKind::FirewallMultiContext => DriverVariant::MultiContext,
            VendorKind::SlowApplianceOs => DriverVariant::SlowAppliance {
                settle: platform.settle_delay.unwrap_or(DEFAULT_SETTLE_DELAY),
            },
        };
        Self { variant, platform }
    }

    pub fn variant(&self) -> DriverVariant {
        self.variant
    }

    pub fn platform(&self) -> &Arc<PlatformDefinition> {
        &self.platform
    }

    /// Connect and authenticate, bounded by the step guard.
    pub async fn open<C: Connector>(
        &self,
        connector: &C,
        target: ConnectTarget<'_>,
        step: &StepGuard<'_>,
    ) -> Result<C::Session> {
        debug!("{}: opening {} session", target.device.id, self.platform.name);
        step.run(connector.connect(target)).await
    }

    /// Run a harmless command and expect a clean prompt back.
    pub async fn probe<S: Session>(&self, session: &mut S, step: &StepGuard<'_>) -> Result<()> {
        self.exchange(session, &self.platform.probe_command, step)
            .await
            .map(|_| ())
    }

    /// Retrieve every unit of `device`, sending each to `tx` as it completes.
    ///
    /// Exactly one [`FetchedUnit`] is sent per unit of the device. A failed
    /// context switch fails only that context. Once the session is lost or a
    /// step times out, the remaining units are reported as not attempted;
    /// after cancellation they are reported as cancelled.
    pub async fn fetch<S: Session>(
        &self,
        session: &mut S,
        device: &DeviceRecord,
        step: &StepGuard<'_>,
        tx: UnboundedSender<FetchedUnit>,
    ) {
        let mut units = device.units().into_iter();

        let started = Instant::now();
        if let Err(err) = self.run_on_open(session, step).await {
            let failure = Failure::from_error(&err, Phase::Fetch);
            debug!("{}: on-open commands failed: {}", device.id, err);
            for unit in units {
                emit(&tx, unit, Err(failure.clone()), started.elapsed());
            }
            return;
        }

        while let Some(unit) = units.next() {
            if step.is_cancelled() {
                emit(&tx, unit, Err(cancelled()), Duration::ZERO);
                for rest in units.by_ref() {
                    emit(&tx, rest, Err(cancelled()), Duration::ZERO);
                }
                return;
            }

            let started = Instant::now();
            match self.fetch_unit(session, &unit, step).await {
                Ok(bytes) => emit(&tx, unit, Ok(bytes), started.elapsed()),
                Err(err) => {
                    let failure = Failure::from_error(&err, Phase::Fetch);
                    let lost = session_lost(&err);
                    emit(&tx, unit, Err(failure.clone()), started.elapsed());

                    if lost {
                        for rest in units.by_ref() {
                            let failure = if failure.kind == FailureKind::Cancelled {
                                cancelled()
                            } else {
                                Failure::new(
                                    FailureKind::Retrieval(RetrievalKind::PartialOutput),
                                    format!("not attempted: {}", failure.detail),
                                )
                            };
                            emit(&tx, rest, Err(failure), Duration::ZERO);
                        }
                        return;
                    }
                }
            }
        }
    }

    /// Close a session, bounded by `timeout`. Errors are logged, not returned.
    pub async fn close<S: Session>(&self, session: &mut S, device_id: &str, timeout: Duration) {
        match tokio::time::timeout(timeout, session.close()).await {
            Ok(Ok(())) => debug!("{}: session closed", device_id),
            Ok(Err(e)) => warn!("{}: error closing session: {}", device_id, e),
            Err(_) => warn!("{}: session close timed out after {:?}", device_id, timeout),
        }
    }

    async fn run_on_open<S: Session>(&self, session: &mut S, step: &StepGuard<'_>) -> Result<()> {
        for command in &self.platform.on_open_commands {
            self.exchange(session, command, step).await?;
        }
        Ok(())
    }

    async fn fetch_unit<S: Session>(
        &self,
        session: &mut S,
        unit: &RetrievalUnit,
        step: &StepGuard<'_>,
    ) -> Result<Bytes> {
        match unit {
            RetrievalUnit::Whole => {}
            RetrievalUnit::System(_) => {
                if let Some(ref command) = self.platform.system_switch_command {
                    self.exchange(session, command, step).await?;
                }
            }
            RetrievalUnit::Context(name) => {
                let command = self.platform.context_switch(name).ok_or_else(|| {
                    PlatformError::InvalidDefinition {
                        message: format!("{} cannot switch contexts", self.platform.name),
                    }
                })?;
                self.exchange(session, &command, step).await?;
            }
        }

        for command in &self.platform.prepare_commands {
            self.exchange(session, command, step).await?;
        }

        let mut output = String::new();
        for command in &self.platform.retrieval_commands {
            let response = self.retrieve(session, command, step).await?;
            if !output.is_empty() {
                output.push_str(OUTPUT_SEPARATOR);
            }
            output.push_str(&response.result);
        }
        output.push('\n');

        Ok(Bytes::from(output))
    }

    async fn retrieve<S: Session>(
        &self,
        session: &mut S,
        command: &str,
        step: &StepGuard<'_>,
    ) -> Result<Response> {
        let response = match self.variant {
            DriverVariant::SlowAppliance { settle } => {
                step.run_for(
                    step.timeout() + settle,
                    session.send_command_settled(command, settle),
                )
                .await?
            }
            DriverVariant::Standard | DriverVariant::MultiContext => {
                step.run(session.send_command(command)).await?
            }
        };
        check(response)
    }

    async fn exchange<S: Session>(
        &self,
        session: &mut S,
        command: &str,
        step: &StepGuard<'_>,
    ) -> Result<Response> {
        let response = step.run(session.send_command(command)).await?;
        check(response)
    }
}

fn check(response: Response) -> Result<Response> {
    match response.failure_message {
        Some(message) => Err(DriverError::CommandFailed {
            command: response.command,
            message,
        }
        .into()),
        None => Ok(response),
    }
}

/// Whether the session can no longer be trusted for further commands.
fn session_lost(err: &Error) -> bool {
    !matches!(
        err,
        Error::Driver(DriverError::CommandFailed { .. }) | Error::Platform(_)
    )
}

fn cancelled() -> Failure {
    Failure::new(FailureKind::Cancelled, "run cancelled")
}

fn emit(
    tx: &UnboundedSender<FetchedUnit>,
    unit: RetrievalUnit,
    output: std::result::Result<Bytes, Failure>,
    duration: Duration,
) {
    let fetched = FetchedUnit {
        unit,
        output,
        duration,
    };
    if let Err(e) = tx.send(fetched) {
        debug!("dropping fetched unit {}: receiver closed", e.0.unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::vendors;
    use crate::testing::{Reply, ScriptedSession};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn driver(kind: VendorKind) -> VendorDriver {
        VendorDriver::new(Arc::new(vendors::platform(kind).unwrap()))
    }

    async fn collect(
        driver: &VendorDriver,
        session: &mut ScriptedSession,
        device: &DeviceRecord,
        cancel: &CancellationToken,
    ) -> Vec<FetchedUnit> {
        let step = StepGuard::new(Duration::from_secs(30), Duration::from_secs(1), cancel);
        let (tx, mut rx) = mpsc::unbounded_channel();
        driver.fetch(session, device, &step, tx).await;

        let mut units = Vec::new();
        while let Some(unit) = rx.recv().await {
            units.push(unit);
        }
        units
    }

    #[test]
    fn test_variant_resolution() {
        assert_eq!(driver(VendorKind::SwitchOs).variant(), DriverVariant::Standard);
        assert_eq!(driver(VendorKind::RouterOs).variant(), DriverVariant::Standard);
        assert_eq!(
            driver(VendorKind::FirewallMultiContext).variant(),
            DriverVariant::MultiContext
        );
        assert_eq!(
            driver(VendorKind::SlowApplianceOs).variant(),
            DriverVariant::SlowAppliance {
                settle: DEFAULT_SETTLE_DELAY
            }
        );
    }

    #[tokio::test]
    async fn test_standard_fetch() {
        let driver = driver(VendorKind::SwitchOs);
        let device = DeviceRecord::new("SW1", "10.0.0.10", VendorKind::SwitchOs);
        let mut session = ScriptedSession::new()
            .reply("show running-config", Reply::output("hostname SW1"));

        let units = collect(&driver, &mut session, &device, &CancellationToken::new()).await;
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit, RetrievalUnit::Whole);
        assert_eq!(units[0].output.as_ref().unwrap(), "hostname SW1\n");
        assert_eq!(
            session.commands(),
            vec!["terminal length 0", "show running-config"]
        );
    }

    #[tokio::test]
    async fn test_multi_context_switch_failure_is_isolated() {
        let driver = driver(VendorKind::FirewallMultiContext);
        let device = DeviceRecord::new("FW1", "10.0.0.30", VendorKind::FirewallMultiContext)
            .with_contexts(["A", "B", "C"]);
        let mut session = ScriptedSession::new().reply(
            "changeto context B",
            Reply::failed("ERROR: Context B not found", "ERROR:"),
        );

        let units = collect(&driver, &mut session, &device, &CancellationToken::new()).await;
        let outcomes: Vec<_> = units
            .iter()
            .map(|u| (u.unit.label().map(String::from), u.output.is_ok()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (Some("system".to_string()), true),
                (Some("A".to_string()), true),
                (Some("B".to_string()), false),
                (Some("C".to_string()), true),
            ]
        );
        assert_eq!(
            units[2].output.as_ref().unwrap_err().kind,
            FailureKind::Retrieval(RetrievalKind::Command)
        );
        assert!(session.commands().contains(&"changeto system".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_session_marks_remaining_not_attempted() {
        let driver = driver(VendorKind::FirewallMultiContext);
        let device = DeviceRecord::new("FW1", "10.0.0.30", VendorKind::FirewallMultiContext)
            .with_contexts(["A", "B", "C"]);
        let mut session = ScriptedSession::new().reply("changeto context B", Reply::Drop);

        let units = collect(&driver, &mut session, &device, &CancellationToken::new()).await;
        assert_eq!(units.len(), 4);
        assert!(units[0].output.is_ok());
        assert!(units[1].output.is_ok());
        for unit in &units[2..] {
            assert_eq!(
                unit.output.as_ref().unwrap_err().kind,
                FailureKind::Retrieval(RetrievalKind::PartialOutput)
            );
        }
        assert!(
            units[3]
                .output
                .as_ref()
                .unwrap_err()
                .detail
                .starts_with("not attempted")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_appliance_waits_for_settle() {
        let driver = driver(VendorKind::SlowApplianceOs);
        let device = DeviceRecord::new("ISE1", "10.0.0.20", VendorKind::SlowApplianceOs);
        let mut session = ScriptedSession::new()
            .reply("show running-config", Reply::output("hostname ISE1"));

        let start = Instant::now();
        let units = collect(&driver, &mut session, &device, &CancellationToken::new()).await;
        assert!(units[0].output.is_ok());
        assert!(start.elapsed() >= DEFAULT_SETTLE_DELAY);
        assert_eq!(session.settled(), vec!["show running-config"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let driver = driver(VendorKind::FirewallMultiContext);
        let device = DeviceRecord::new("FW1", "10.0.0.30", VendorKind::FirewallMultiContext)
            .with_contexts(["DMZ"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut session = ScriptedSession::new();

        let units = collect(&driver, &mut session, &device, &cancel).await;
        assert_eq!(units.len(), 2);
        assert!(
            units
                .iter()
                .all(|u| u.output.as_ref().unwrap_err().kind == FailureKind::Cancelled)
        );
    }
}
