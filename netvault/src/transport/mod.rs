//! SSH transport layer wrapping russh.
//!
//! This module provides the low-level SSH connection management,
//! handling connection setup, password authentication, shell channels and
//! subsystem channels.

pub mod config;
mod ssh;

pub use config::{HostKeyVerification, SshConfig, SshOptions};
pub use ssh::SshTransport;
