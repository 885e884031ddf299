//! Connection profiles and connect targets.

use std::sync::Arc;
use std::time::Duration;

use crate::config::TimeoutPolicy;
use crate::credentials::{Credential, CredentialRef};
use crate::inventory::{DeviceRecord, VendorKind};
use crate::platform::PlatformDefinition;

/// How to reach one device during a run.
///
/// Derived at run start from the device record and the run's timeout
/// policy; the credential is only referenced, never copied.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    /// Device this profile belongs to.
    pub device_id: String,

    /// Vendor kind, which selects the timeout override.
    pub vendor_kind: VendorKind,

    /// Credential domain to authenticate with.
    pub credential_ref: CredentialRef,

    /// Timeout policy of the run.
    pub timeout_policy: TimeoutPolicy,
}

impl ConnectionProfile {
    /// Derive the profile for a device.
    pub fn derive(device: &DeviceRecord, timeout_policy: &TimeoutPolicy) -> Self {
        Self {
            device_id: device.id.clone(),
            vendor_kind: device.vendor_kind,
            credential_ref: CredentialRef::new(device.credential.as_str()),
            timeout_policy: timeout_policy.clone(),
        }
    }

    /// Per-operation timeout for this device.
    pub fn timeout(&self) -> Duration {
        self.timeout_policy.resolve(self.vendor_kind)
    }
}

/// Everything a [`Connector`](super::Connector) needs to open one session.
#[derive(Debug, Clone, Copy)]
pub struct ConnectTarget<'a> {
    pub device: &'a DeviceRecord,
    pub credential: &'a Credential,
    pub platform: &'a Arc<PlatformDefinition>,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_resolves_vendor_timeout() {
        let policy = TimeoutPolicy::new(Duration::from_secs(30))
            .with_override(VendorKind::SlowApplianceOs, Duration::from_secs(120));

        let ise = DeviceRecord::new("ISE-PRIMARY", "10.0.0.20", VendorKind::SlowApplianceOs)
            .with_credential("appliance");
        let profile = ConnectionProfile::derive(&ise, &policy);
        assert_eq!(profile.timeout(), Duration::from_secs(120));
        assert_eq!(profile.credential_ref.domain(), "appliance");

        let sw = DeviceRecord::new("CORE-SW-01", "10.0.0.10", VendorKind::SwitchOs);
        assert_eq!(
            ConnectionProfile::derive(&sw, &policy).timeout(),
            Duration::from_secs(30)
        );
    }
}
