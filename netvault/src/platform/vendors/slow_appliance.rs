//! Slow-CLI appliance platform definition.
//!
//! The appliance echoes a command long before it writes the output, so a
//! read that starts right after the echo sees the prompt of the previous
//! command and returns truncated data. Retrieval waits a settle delay after
//! issuing each command before reading.
//!
//! # Prompt Examples
//!
//! ```text
//! ISE-PRIMARY/admin#
//! ```

use std::time::Duration;

use crate::error::PlatformError;
use crate::inventory::VendorKind;
use crate::platform::PlatformDefinition;

/// Default settle delay for the appliance CLI.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Create the slow appliance platform definition.
pub fn platform() -> Result<PlatformDefinition, PlatformError> {
    Ok(PlatformDefinition::new(
        VendorKind::SlowApplianceOs.as_str(),
        VendorKind::SlowApplianceOs,
        r"(?m)^[\w.\-@/]{1,63}#\s?$",
    )?
    .with_failure_pattern("% Invalid")
    .with_failure_pattern("% Error")
    .with_failure_pattern("% Unknown command")
    .with_on_open_command("terminal length 0")
    .with_retrieval_command("show running-config")
    .with_settle_delay(DEFAULT_SETTLE_DELAY)
    .with_terminal_size(511, 24))
}
