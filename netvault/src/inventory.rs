//! Device inventory: the static set of devices a run works through.
//!
//! The inventory is declarative data, loaded once at run start and never
//! mutated afterwards. Device order is the order of declaration, which is
//! what result and log ordering follow.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Credential domain used when a device does not name one.
pub const DEFAULT_CREDENTIAL: &str = "default";

/// Label of the system-level unit of a multi-context device.
pub const SYSTEM_CONTEXT: &str = "system";

/// Family of command-line surface a device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorKind {
    /// Data-center switch OS (`terminal length 0` / `show running-config`).
    SwitchOs,
    /// Router OS, same retrieval surface as the switch OS.
    RouterOs,
    /// Firewall with independently configured security contexts.
    FirewallMultiContext,
    /// Appliance whose CLI answers asynchronously to the command echo.
    SlowApplianceOs,
}

impl VendorKind {
    /// All kinds, in declaration order.
    pub const ALL: [VendorKind; 4] = [
        VendorKind::SwitchOs,
        VendorKind::RouterOs,
        VendorKind::FirewallMultiContext,
        VendorKind::SlowApplianceOs,
    ];

    /// Stable snake_case name, as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SwitchOs => "switch_os",
            Self::RouterOs => "router_os",
            Self::FirewallMultiContext => "firewall_multi_context",
            Self::SlowApplianceOs => "slow_appliance_os",
        }
    }

    /// Whether devices of this kind carry security contexts.
    pub fn is_multi_context(&self) -> bool {
        matches!(self, Self::FirewallMultiContext)
    }
}

impl fmt::Display for VendorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_port() -> u16 {
    22
}

fn default_credential() -> String {
    DEFAULT_CREDENTIAL.to_string()
}

/// One device in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique identifier, also the prefix of every artifact name.
    pub id: String,

    /// Human-readable name for reports.
    #[serde(default)]
    pub display_name: String,

    /// Hostname or IP address.
    pub address: String,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Command-line family of the device.
    pub vendor_kind: VendorKind,

    /// Security contexts, in retrieval order. Empty unless multi-context.
    #[serde(default)]
    pub contexts: Vec<String>,

    /// Credential domain to authenticate with.
    #[serde(default = "default_credential")]
    pub credential: String,
}

impl DeviceRecord {
    /// Create a record with default port and credential domain.
    pub fn new(id: impl Into<String>, address: impl Into<String>, vendor_kind: VendorKind) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            address: address.into(),
            port: default_port(),
            vendor_kind,
            contexts: Vec::new(),
            credential: default_credential(),
        }
    }

    /// Set the security contexts.
    pub fn with_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the credential domain.
    pub fn with_credential(mut self, domain: impl Into<String>) -> Self {
        self.credential = domain.into();
        self
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// The retrieval units of this device, in order.
    ///
    /// Single-surface devices have one [`RetrievalUnit::Whole`]. A
    /// multi-context device has the system-level unit first, then one unit
    /// per listed context. A listed context named `system` (any case) is the
    /// system-level unit itself and keeps its listed spelling.
    pub fn units(&self) -> Vec<RetrievalUnit> {
        if !self.vendor_kind.is_multi_context() {
            return vec![RetrievalUnit::Whole];
        }

        let system = self
            .contexts
            .iter()
            .find(|c| is_system_context(c))
            .map(String::as_str)
            .unwrap_or(SYSTEM_CONTEXT);

        let mut units = Vec::with_capacity(self.contexts.len() + 1);
        units.push(RetrievalUnit::System(system.to_string()));
        units.extend(
            self.contexts
                .iter()
                .filter(|c| !is_system_context(c))
                .map(|c| RetrievalUnit::Context(c.clone())),
        );
        units
    }

    fn validate(&self) -> Result<()> {
        check_name("device id", &self.id)?;

        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: format!("device '{}' has no address", self.id),
            }
            .into());
        }

        if !self.vendor_kind.is_multi_context() && !self.contexts.is_empty() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "device '{}' lists contexts but {} has none",
                    self.id, self.vendor_kind
                ),
            }
            .into());
        }

        let mut seen = Vec::with_capacity(self.contexts.len());
        for context in &self.contexts {
            check_name("context name", context)?;
            let folded = context.to_ascii_lowercase();
            if seen.contains(&folded) {
                return Err(ConfigError::Invalid {
                    message: format!("device '{}' lists context '{}' twice", self.id, context),
                }
                .into());
            }
            seen.push(folded);
        }

        Ok(())
    }
}

/// One configuration retrieved from a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RetrievalUnit {
    /// The only configuration of a single-surface device.
    Whole,
    /// The system-level configuration of a multi-context device.
    System(String),
    /// A named security context.
    Context(String),
}

impl RetrievalUnit {
    /// Context label used in results and artifact names.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Whole => None,
            Self::System(name) | Self::Context(name) => Some(name),
        }
    }
}

impl fmt::Display for RetrievalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => f.write_str("-"),
        }
    }
}

/// Whether a context label names the system-level unit.
pub fn is_system_context(name: &str) -> bool {
    name.eq_ignore_ascii_case(SYSTEM_CONTEXT)
}

fn check_name(what: &'static str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidName {
            what,
            value: value.to_string(),
        }
        .into())
    }
}

/// Validated, ordered, immutable set of devices.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    devices: IndexMap<String, DeviceRecord>,
}

impl Inventory {
    /// Build an inventory, rejecting duplicate ids and malformed records.
    pub fn new(records: impl IntoIterator<Item = DeviceRecord>) -> Result<Self> {
        let mut devices = IndexMap::new();
        for record in records {
            record.validate()?;
            if devices.contains_key(&record.id) {
                return Err(ConfigError::DuplicateDevice(record.id).into());
            }
            devices.insert(record.id.clone(), record);
        }
        Ok(Self { devices })
    }

    /// Get a device by id.
    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    /// Iterate devices in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the inventory is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
