//! Per-run set of resolved platform definitions.

use std::sync::Arc;

use super::definition::PlatformDefinition;
use super::vendors;
use crate::config::PerVendor;
use crate::error::Result;
use crate::inventory::VendorKind;
use crate::platform::VendorOverride;

/// One resolved definition per vendor kind.
///
/// Built once at run start from the built-in definitions plus the
/// deployment's overrides, then shared read-only by every session.
#[derive(Debug, Clone)]
pub struct PlatformSet {
    switch_os: Arc<PlatformDefinition>,
    router_os: Arc<PlatformDefinition>,
    firewall_multi_context: Arc<PlatformDefinition>,
    slow_appliance_os: Arc<PlatformDefinition>,
}

impl PlatformSet {
    /// The built-in definitions without overrides.
    pub fn builtin() -> Result<Self> {
        Self::resolve(&PerVendor::default())
    }

    /// Resolve every kind, applying overrides where present.
    pub fn resolve(overrides: &PerVendor<VendorOverride>) -> Result<Self> {
        let build = |kind: VendorKind| -> Result<Arc<PlatformDefinition>> {
            let platform = vendors::platform(kind)?;
            let platform = match overrides.get(kind) {
                Some(vendor) => platform.apply(vendor)?,
                None => platform,
            };
            Ok(Arc::new(platform))
        };

        Ok(Self {
            switch_os: build(VendorKind::SwitchOs)?,
            router_os: build(VendorKind::RouterOs)?,
            firewall_multi_context: build(VendorKind::FirewallMultiContext)?,
            slow_appliance_os: build(VendorKind::SlowApplianceOs)?,
        })
    }

    /// The definition for a kind.
    pub fn get(&self, kind: VendorKind) -> &Arc<PlatformDefinition> {
        match kind {
            VendorKind::SwitchOs => &self.switch_os,
            VendorKind::RouterOs => &self.router_os,
            VendorKind::FirewallMultiContext => &self.firewall_multi_context,
            VendorKind::SlowApplianceOs => &self.slow_appliance_os,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_overrides_apply_per_kind() {
        let mut overrides = PerVendor::default();
        overrides.set(
            VendorKind::SlowApplianceOs,
            VendorOverride {
                settle_delay_secs: Some(2),
                ..Default::default()
            },
        );

        let set = PlatformSet::resolve(&overrides).unwrap();
        assert_eq!(
            set.get(VendorKind::SlowApplianceOs).settle_delay,
            Some(Duration::from_secs(2))
        );
        assert_eq!(set.get(VendorKind::SwitchOs).settle_delay, None);
    }

    #[test]
    fn test_invalid_override_fails_resolution() {
        let mut overrides = PerVendor::default();
        overrides.set(
            VendorKind::SwitchOs,
            VendorOverride {
                retrieval_commands: Some(vec![]),
                ..Default::default()
            },
        );
        assert!(PlatformSet::resolve(&overrides).is_err());
    }
}
