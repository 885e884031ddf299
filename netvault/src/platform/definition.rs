//! Platform definition: the per-vendor data a session runs on.

use std::fmt;
use std::time::Duration;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::inventory::VendorKind;

/// Placeholder replaced by the context name in context switch commands.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Leading output lines searched for failure patterns.
const FAILURE_SCAN_LINES: usize = 3;

/// Everything vendor-specific about retrieving a configuration.
///
/// Built-in definitions live in [`vendors`](super::vendors); deployments
/// adjust them with a [`VendorOverride`] rather than with code.
#[derive(Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "switch_os", "firewall_multi_context").
    pub name: String,

    /// Vendor kind this definition serves.
    pub vendor_kind: VendorKind,

    /// Pattern matching the CLI prompt at the end of output.
    pub prompt_pattern: Regex,

    /// Patterns that indicate command failure.
    pub failed_when_contains: Vec<String>,

    /// Commands to run when the session is opened (pager off, width).
    pub on_open_commands: Vec<String>,

    /// Commands run before each retrieval unit; their output is discarded.
    pub prepare_commands: Vec<String>,

    /// Commands whose output makes up one retrieval unit.
    pub retrieval_commands: Vec<String>,

    /// Command returning to the system-level context, if the platform has one.
    pub system_switch_command: Option<String>,

    /// Command template switching into a named context.
    pub context_switch_command: Option<String>,

    /// Wait between issuing a retrieval command and reading its output.
    pub settle_delay: Option<Duration>,

    /// Harmless input used to probe a session; answered with a prompt.
    pub probe_command: String,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,
}

impl PlatformDefinition {
    /// Create a new platform definition with minimal required fields.
    pub fn new(
        name: impl Into<String>,
        vendor_kind: VendorKind,
        prompt_pattern: &str,
    ) -> Result<Self, PlatformError> {
        Ok(Self {
            name: name.into(),
            vendor_kind,
            prompt_pattern: Regex::new(prompt_pattern)?,
            failed_when_contains: vec![],
            on_open_commands: vec![],
            prepare_commands: vec![],
            retrieval_commands: vec![],
            system_switch_command: None,
            context_switch_command: None,
            settle_delay: None,
            probe_command: String::new(),
            terminal_width: 511,
            terminal_height: 24,
        })
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Add a prepare command.
    pub fn with_prepare_command(mut self, command: impl Into<String>) -> Self {
        self.prepare_commands.push(command.into());
        self
    }

    /// Add a retrieval command.
    pub fn with_retrieval_command(mut self, command: impl Into<String>) -> Self {
        self.retrieval_commands.push(command.into());
        self
    }

    /// Set the command returning to the system context.
    pub fn with_system_switch(mut self, command: impl Into<String>) -> Self {
        self.system_switch_command = Some(command.into());
        self
    }

    /// Set the context switch template (must contain `{context}`).
    pub fn with_context_switch(mut self, template: impl Into<String>) -> Self {
        self.context_switch_command = Some(template.into());
        self
    }

    /// Set the settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// The command that switches into `context`, if the platform has contexts.
    pub fn context_switch(&self, context: &str) -> Option<String> {
        self.context_switch_command
            .as_ref()
            .map(|template| template.replace(CONTEXT_PLACEHOLDER, context))
    }

    /// Return the first failure pattern found in the output.
    ///
    /// Only the first few non-blank lines are searched: a CLI reports a
    /// rejected command right after the echo, while a configuration body may
    /// quote the same text in banners or descriptions.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        let head: Vec<&str> = output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(FAILURE_SCAN_LINES)
            .collect();
        self.failed_when_contains
            .iter()
            .find(|pattern| head.iter().any(|line| line.contains(pattern.as_str())))
            .map(String::as_str)
    }

    /// Apply a deployment override on top of this definition.
    pub fn apply(mut self, vendor: &VendorOverride) -> Result<Self, PlatformError> {
        if let Some(ref pattern) = vendor.prompt_pattern {
            self.prompt_pattern = Regex::new(pattern)?;
        }
        if let Some(ref patterns) = vendor.failed_when_contains {
            self.failed_when_contains = patterns.clone();
        }
        if let Some(ref commands) = vendor.on_open_commands {
            self.on_open_commands = commands.clone();
        }
        if let Some(ref commands) = vendor.prepare_commands {
            self.prepare_commands = commands.clone();
        }
        if let Some(ref commands) = vendor.retrieval_commands {
            self.retrieval_commands = commands.clone();
        }
        if let Some(ref command) = vendor.system_switch_command {
            self.system_switch_command = Some(command.clone());
        }
        if let Some(ref template) = vendor.context_switch_command {
            self.context_switch_command = Some(template.clone());
        }
        if let Some(secs) = vendor.settle_delay_secs {
            self.settle_delay = Some(Duration::from_secs(secs));
        }
        self.validate()?;
        Ok(self)
    }

    /// Check the definition is usable for its vendor kind.
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.retrieval_commands.is_empty() {
            return Err(PlatformError::InvalidDefinition {
                message: format!("{} has no retrieval commands", self.name),
            });
        }
        if self.vendor_kind.is_multi_context() {
            let valid = self
                .context_switch_command
                .as_deref()
                .is_some_and(|t| t.contains(CONTEXT_PLACEHOLDER));
            if !valid {
                return Err(PlatformError::InvalidDefinition {
                    message: format!(
                        "{} needs a context switch command containing {}",
                        self.name, CONTEXT_PLACEHOLDER
                    ),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PlatformDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformDefinition")
            .field("name", &self.name)
            .field("vendor_kind", &self.vendor_kind)
            .field("prompt_pattern", &self.prompt_pattern.as_str())
            .field("failed_when_contains", &self.failed_when_contains)
            .field("on_open_commands", &self.on_open_commands)
            .field("prepare_commands", &self.prepare_commands)
            .field("retrieval_commands", &self.retrieval_commands)
            .field("context_switch_command", &self.context_switch_command)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

/// Deployment-level adjustments to a built-in platform definition.
///
/// Every field is optional; unset fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorOverride {
    pub prompt_pattern: Option<String>,
    pub failed_when_contains: Option<Vec<String>>,
    pub on_open_commands: Option<Vec<String>>,
    pub prepare_commands: Option<Vec<String>>,
    pub retrieval_commands: Option<Vec<String>>,
    pub system_switch_command: Option<String>,
    pub context_switch_command: Option<String>,
    pub settle_delay_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firewall() -> PlatformDefinition {
        PlatformDefinition::new("fw", VendorKind::FirewallMultiContext, r"#\s*$")
            .unwrap()
            .with_retrieval_command("show running-config")
            .with_context_switch("changeto context {context}")
            .with_failure_pattern("ERROR:")
    }

    #[test]
    fn test_context_switch_template() {
        let platform = firewall();
        assert_eq!(
            platform.context_switch("DMZ").as_deref(),
            Some("changeto context DMZ")
        );
    }

    #[test]
    fn test_detect_failure() {
        let platform = firewall();
        assert_eq!(
            platform.detect_failure("ERROR: Context not found"),
            Some("ERROR:")
        );
        assert_eq!(platform.detect_failure("hostname fw1"), None);
        assert_eq!(
            platform.detect_failure("\n         ^\nERROR: % Invalid input detected at '^' marker."),
            Some("ERROR:")
        );
    }

    #[test]
    fn test_failure_text_inside_config_is_not_a_failure() {
        let platform = firewall();
        let config = ": Saved\n\
                      ASA Version 9.16(4)\n\
                      hostname fw1\n\
                      interface Management0/0\n \
                      description ERROR: do not unplug\n\
                      banner motd ERROR: authorized access only\n";
        assert_eq!(platform.detect_failure(config), None);
    }

    #[test]
    fn test_apply_override() {
        let vendor = VendorOverride {
            retrieval_commands: Some(vec!["more system:running-config".to_string()]),
            settle_delay_secs: Some(3),
            ..Default::default()
        };
        let platform = firewall().apply(&vendor).unwrap();
        assert_eq!(platform.retrieval_commands, vec!["more system:running-config"]);
        assert_eq!(platform.settle_delay, Some(Duration::from_secs(3)));
        assert_eq!(platform.failed_when_contains, vec!["ERROR:"]);
    }

    #[test]
    fn test_override_rejects_template_without_placeholder() {
        let vendor = VendorOverride {
            context_switch_command: Some("changeto context".to_string()),
            ..Default::default()
        };
        assert!(firewall().apply(&vendor).is_err());
    }

    #[test]
    fn test_override_rejects_bad_regex() {
        let vendor = VendorOverride {
            prompt_pattern: Some("([".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            firewall().apply(&vendor),
            Err(PlatformError::InvalidPattern(_))
        ));
    }
}
