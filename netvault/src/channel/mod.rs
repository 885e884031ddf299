//! Channel layer for prompt-driven PTY sessions.
//!
//! This module handles the interactive shell: sending command lines and
//! reading output until the device prompt, with ANSI escape stripping.

mod buffer;
mod pty;

pub use buffer::PatternBuffer;
pub use pty::{DEFAULT_SEARCH_DEPTH, PtyChannel};
