//! Run configuration and the TOML configuration file.
//!
//! A configuration file carries the device inventory and the run policy:
//!
//! ```toml
//! [run]
//! max_in_flight = 4
//! cancel_grace_secs = 5
//!
//! [run.sampling]
//! mode = "per_vendor"
//!
//! [timeouts]
//! base_secs = 90
//!
//! [timeouts.per_vendor]
//! slow_appliance_os = 180
//!
//! [vendors.slow_appliance_os]
//! settle_delay_secs = 10
//!
//! [ssh]
//! host_key_verification = "accept_new"
//!
//! [sftp]
//! host = "10.0.0.50"
//! remote_dir = "/srv/backups"
//!
//! [[devices]]
//! id = "ASA-FW-01"
//! address = "10.0.0.30"
//! vendor_kind = "firewall_multi_context"
//! contexts = ["MGMT", "DMZ"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::inventory::{DeviceRecord, Inventory, VendorKind};
use crate::platform::VendorOverride;
use crate::sink::SftpSettings;
use crate::transport::SshOptions;
use crate::validator::SamplingPolicy;

/// A value per vendor kind, each optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerVendor<T> {
    pub switch_os: Option<T>,
    pub router_os: Option<T>,
    pub firewall_multi_context: Option<T>,
    pub slow_appliance_os: Option<T>,
}

impl<T> Default for PerVendor<T> {
    fn default() -> Self {
        Self {
            switch_os: None,
            router_os: None,
            firewall_multi_context: None,
            slow_appliance_os: None,
        }
    }
}

impl<T> PerVendor<T> {
    /// Value for a kind, if set.
    pub fn get(&self, kind: VendorKind) -> Option<&T> {
        match kind {
            VendorKind::SwitchOs => self.switch_os.as_ref(),
            VendorKind::RouterOs => self.router_os.as_ref(),
            VendorKind::FirewallMultiContext => self.firewall_multi_context.as_ref(),
            VendorKind::SlowApplianceOs => self.slow_appliance_os.as_ref(),
        }
    }

    /// Set the value for a kind.
    pub fn set(&mut self, kind: VendorKind, value: T) {
        let slot = match kind {
            VendorKind::SwitchOs => &mut self.switch_os,
            VendorKind::RouterOs => &mut self.router_os,
            VendorKind::FirewallMultiContext => &mut self.firewall_multi_context,
            VendorKind::SlowApplianceOs => &mut self.slow_appliance_os,
        };
        *slot = Some(value);
    }
}

/// Per-operation timeout with optional per-vendor overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutPolicy {
    /// Timeout for vendors without an override.
    pub base: Duration,

    /// Overrides, taking precedence over `base`.
    pub per_vendor: PerVendor<Duration>,
}

impl TimeoutPolicy {
    /// Policy with only a base timeout.
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            per_vendor: PerVendor::default(),
        }
    }

    /// Add a per-vendor override.
    pub fn with_override(mut self, kind: VendorKind, timeout: Duration) -> Self {
        self.per_vendor.set(kind, timeout);
        self
    }

    /// The timeout that applies to a vendor kind.
    pub fn resolve(&self, kind: VendorKind) -> Duration {
        self.per_vendor.get(kind).copied().unwrap_or(self.base)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(90))
    }
}

/// Policy for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of device sessions in flight at once.
    pub max_in_flight: usize,

    /// Per-operation timeouts.
    pub timeouts: TimeoutPolicy,

    /// How long an in-flight step may continue after cancellation.
    pub cancel_grace: Duration,

    /// Which devices the credential validator probes.
    pub sampling: SamplingPolicy,

    /// Per-vendor platform overrides (commands, settle delay).
    pub vendors: PerVendor<VendorOverride>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            timeouts: TimeoutPolicy::default(),
            cancel_grace: Duration::from_secs(5),
            sampling: SamplingPolicy::default(),
            vendors: PerVendor::default(),
        }
    }
}

impl RunConfig {
    /// Set the worker-pool bound (at least one).
    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Set the timeout policy.
    pub fn timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the cancellation grace period.
    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Set the validator sampling policy.
    pub fn sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = sampling;
        self
    }

    /// Override platform data for a vendor kind.
    pub fn vendor_override(mut self, kind: VendorKind, vendor: VendorOverride) -> Self {
        self.vendors.set(kind, vendor);
        self
    }

    /// Apply `NETVAULT_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(max) = env_u64("NETVAULT_MAX_IN_FLIGHT") {
            self.max_in_flight = usize::try_from(max).unwrap_or(usize::MAX).max(1);
        }
        if let Some(secs) = env_u64("NETVAULT_TIMEOUT_SECS") {
            self.timeouts.base = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("NETVAULT_CANCEL_GRACE_SECS") {
            self.cancel_grace = Duration::from_secs(secs);
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not an unsigned integer", name, raw);
            None
        }
    }
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub max_in_flight: usize,
    pub cancel_grace_secs: u64,
    pub sampling: SamplingPolicy,
}

impl Default for RunSection {
    fn default() -> Self {
        let defaults = RunConfig::default();
        Self {
            max_in_flight: defaults.max_in_flight,
            cancel_grace_secs: defaults.cancel_grace.as_secs(),
            sampling: defaults.sampling,
        }
    }
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSection {
    pub base_secs: u64,
    pub per_vendor: PerVendor<u64>,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            base_secs: TimeoutPolicy::default().base.as_secs(),
            per_vendor: PerVendor::default(),
        }
    }
}

impl TimeoutSection {
    fn to_policy(&self) -> TimeoutPolicy {
        let mut policy = TimeoutPolicy::new(Duration::from_secs(self.base_secs));
        for kind in VendorKind::ALL {
            if let Some(secs) = self.per_vendor.get(kind) {
                policy.per_vendor.set(kind, Duration::from_secs(*secs));
            }
        }
        policy
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub run: RunSection,
    pub timeouts: TimeoutSection,
    pub vendors: PerVendor<VendorOverride>,
    pub ssh: SshOptions,

    /// Backup server receiving a copy of every artifact, if any.
    pub sftp: Option<SftpSettings>,

    pub devices: Vec<DeviceRecord>,
}

impl ConfigFile {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ConfigFile = toml::from_str(content).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: PathBuf::from(path),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Validate and split into the inventory and the run policy.
    pub fn into_parts(self) -> Result<(Inventory, RunConfig)> {
        if self.run.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                message: "run.max_in_flight must be at least 1".to_string(),
            }
            .into());
        }
        if self.timeouts.base_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "timeouts.base_secs must be at least 1".to_string(),
            }
            .into());
        }
        if let Some(ref sftp) = self.sftp {
            sftp.validate()?;
        }

        let inventory = Inventory::new(self.devices)?;
        let config = RunConfig {
            max_in_flight: self.run.max_in_flight,
            timeouts: self.timeouts.to_policy(),
            cancel_grace: Duration::from_secs(self.run.cancel_grace_secs),
            sampling: self.run.sampling,
            vendors: self.vendors,
        };
        Ok((inventory, config))
    }
}
