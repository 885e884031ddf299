//! Platform definitions for multi-vendor support.
//!
//! This module defines vendor-specific configurations including
//! prompt patterns, retrieval commands and timing quirks.

mod definition;
mod registry;
pub mod vendors;

pub use definition::{CONTEXT_PLACEHOLDER, PlatformDefinition, VendorOverride};
pub use registry::PlatformSet;

/// Normalize command output: strip the command echo and the trailing prompt.
pub fn normalize_output(raw: &str, command: &str) -> String {
    let output = raw.trim_start_matches(['\r', '\n']);

    // The echo is the first line when it carries the command
    let output = match output.split_once('\n') {
        Some((first, rest)) if !command.is_empty() && first.trim_end().ends_with(command) => rest,
        _ => output.strip_prefix(command).unwrap_or(output),
    };

    // Strip trailing prompt (last line)
    let output = output.trim_end_matches(['\r', '\n', ' ']);
    let body = match output.rfind('\n') {
        Some(pos) => &output[..pos],
        None => "",
    };

    body.replace("\r\n", "\n").trim_end_matches(['\r', '\n']).to_string()
}
