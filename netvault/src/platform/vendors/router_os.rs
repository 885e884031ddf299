//! Router OS platform definition.
//!
//! Routers may land in user exec (`>`) or privileged exec (`#`); both
//! answer `show running-config` once the account has privilege 15.
//!
//! # Prompt Examples
//!
//! ```text
//! EDGE-RTR-01>
//! EDGE-RTR-01#
//! ```

use crate::error::PlatformError;
use crate::inventory::VendorKind;
use crate::platform::PlatformDefinition;

/// Create the router OS platform definition.
pub fn platform() -> Result<PlatformDefinition, PlatformError> {
    Ok(PlatformDefinition::new(
        VendorKind::RouterOs.as_str(),
        VendorKind::RouterOs,
        r"(?m)^[\w.\-@()/:]{1,63}[>#]\s?$",
    )?
    .with_failure_pattern("% Invalid input")
    .with_failure_pattern("% Ambiguous command")
    .with_failure_pattern("% Incomplete command")
    .with_failure_pattern("% Unknown command")
    .with_failure_pattern("% Authorization failed")
    .with_on_open_command("terminal length 0")
    .with_retrieval_command("show running-config")
    .with_terminal_size(511, 24))
}
