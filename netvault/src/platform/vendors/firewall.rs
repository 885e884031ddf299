//! Multi-context firewall platform definition.
//!
//! The firewall hosts several security contexts. Retrieval starts in the
//! system context and then visits each context with `changeto context`.
//! Saving (`write memory`) runs before every capture so the backup matches
//! the startup configuration.
//!
//! # Prompt Examples
//!
//! ```text
//! ASA-FW-01#                # system context
//! ASA-FW-01/DMZ#            # security context
//! ASA-FW-01/DMZ(config)#    # configuration in a context
//! ```

use crate::error::PlatformError;
use crate::inventory::VendorKind;
use crate::platform::PlatformDefinition;

/// Create the multi-context firewall platform definition.
pub fn platform() -> Result<PlatformDefinition, PlatformError> {
    Ok(PlatformDefinition::new(
        VendorKind::FirewallMultiContext.as_str(),
        VendorKind::FirewallMultiContext,
        r"(?m)^[\w.\-@()/:]{1,63}[>#]\s?$",
    )?
    .with_failure_pattern("ERROR:")
    .with_failure_pattern("% Invalid input")
    .with_failure_pattern("Command authorization failed")
    .with_on_open_command("terminal pager 0")
    .with_prepare_command("write memory")
    .with_retrieval_command("show running-config")
    .with_system_switch("changeto system")
    .with_context_switch("changeto context {context}")
    .with_terminal_size(511, 24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_match() {
        let platform = platform().unwrap();
        let prompt = &platform.prompt_pattern;

        assert!(prompt.is_match(b"ASA-FW-01#"));
        assert!(prompt.is_match(b"ASA-FW-01/DMZ#"));
        assert!(prompt.is_match(b"ASA-FW-01/DMZ(config)#"));
        assert!(prompt.is_match(b"ASA-FW-01>"));
        assert!(!prompt.is_match(b"ASA-FW-01# changeto context DMZ"));
    }

    #[test]
    fn test_context_commands() {
        let platform = platform().unwrap();
        assert_eq!(
            platform.context_switch("BACKEND").as_deref(),
            Some("changeto context BACKEND")
        );
        assert_eq!(platform.prepare_commands, vec!["write memory"]);
        assert_eq!(platform.retrieval_commands, vec!["show running-config"]);
        assert_eq!(
            platform.system_switch_command.as_deref(),
            Some("changeto system")
        );
        assert_eq!(
            platform.detect_failure("ERROR: No context named BACKEND"),
            Some("ERROR:")
        );
    }
}
