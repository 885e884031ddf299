//! Built-in vendor platform definitions.
//!
//! Commands and timings follow what the supported device families need for
//! an unattended `show running-config`: pager off, then the retrieval
//! commands, plus the per-family quirks (contexts, settle delay).

pub mod firewall;
pub mod router_os;
pub mod slow_appliance;
pub mod switch_os;

use crate::error::PlatformError;
use crate::inventory::VendorKind;
use crate::platform::PlatformDefinition;

/// Built-in definition for a vendor kind.
pub fn platform(kind: VendorKind) -> Result<PlatformDefinition, PlatformError> {
    match kind {
        VendorKind::SwitchOs => switch_os::platform(),
        VendorKind::RouterOs => router_os::platform(),
        VendorKind::FirewallMultiContext => firewall::platform(),
        VendorKind::SlowApplianceOs => slow_appliance::platform(),
    }
}
