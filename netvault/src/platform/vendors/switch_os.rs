//! Data-center switch OS platform definition.
//!
//! # Prompt Examples
//!
//! ```text
//! CORE-SW-01#               # exec
//! CORE-SW-01(config)#       # configuration
//! ```

use crate::error::PlatformError;
use crate::inventory::VendorKind;
use crate::platform::PlatformDefinition;

/// Create the switch OS platform definition.
pub fn platform() -> Result<PlatformDefinition, PlatformError> {
    Ok(PlatformDefinition::new(
        VendorKind::SwitchOs.as_str(),
        VendorKind::SwitchOs,
        r"(?m)^[\w.\-@()/:]{1,63}#\s?$",
    )?
    .with_failure_pattern("% Invalid command")
    .with_failure_pattern("% Invalid input")
    .with_failure_pattern("% Incomplete command")
    .with_failure_pattern("% Permission denied")
    .with_failure_pattern("Syntax error while parsing")
    .with_on_open_command("terminal length 0")
    .with_retrieval_command("show running-config")
    .with_terminal_size(511, 24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_match() {
        let platform = platform().unwrap();
        let prompt = &platform.prompt_pattern;

        assert!(prompt.is_match(b"CORE-SW-01#"));
        assert!(prompt.is_match(b"CORE-SW-01# "));
        assert!(prompt.is_match(b"interface Eth1/1\r\nCORE-SW-01#"));
        assert!(prompt.is_match(b"CORE-SW-01(config)#"));

        assert!(!prompt.is_match(b"CORE-SW-01# show running-config"));
        assert!(!prompt.is_match(b"CORE-SW-01>"));
    }

    #[test]
    fn test_commands() {
        let platform = platform().unwrap();
        assert_eq!(platform.on_open_commands, vec!["terminal length 0"]);
        assert_eq!(platform.retrieval_commands, vec!["show running-config"]);
        assert!(platform.settle_delay.is_none());
        assert!(platform.context_switch_command.is_none());
    }
}
