//! Error types for netvault.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for netvault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Platform/vendor errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Inventory or configuration file errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Artifact sink errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key does not match the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host is not present in known_hosts (strict mode)
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel layer errors (pattern matching, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),
}

/// Driver layer errors (session lifecycle, command execution).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Driver not connected
    #[error("Driver not connected - call open() first")]
    NotConnected,

    /// Command output matched one of the platform's failure patterns
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// A session step exceeded its timeout
    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled while the step was in flight
    #[error("Cancelled")]
    Cancelled,
}

/// Platform/vendor definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },

    /// Invalid regex pattern in a platform definition
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Inventory and configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two devices share an id
    #[error("Duplicate device id '{0}'")]
    DuplicateDevice(String),

    /// Device ids and context names are restricted to `[A-Za-z0-9.-]`
    #[error("Invalid {what} '{value}': only ASCII letters, digits, '.' and '-' are allowed")]
    InvalidName { what: &'static str, value: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Artifact sink errors.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The sink endpoint cannot be reached
    #[error("Sink unreachable: {0}")]
    Unreachable(String),

    /// The sink rejected an artifact
    #[error("Failed to ingest '{name}': {message}")]
    Ingest { name: String, message: String },

    /// An artifact with this name was already ingested
    #[error("Artifact '{0}' already ingested")]
    Duplicate(String),

    /// A file operation on the remote server failed
    #[error("Remote file operation failed: {0}")]
    Remote(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias using netvault's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_layers() {
        let err: Error = DriverError::CommandFailed {
            command: "show running-config".to_string(),
            message: "% Invalid input".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Driver error: Command 'show running-config' failed: % Invalid input"
        );

        let err: Error = TransportError::AuthenticationFailed {
            user: "admin".to_string(),
        }
        .into();
        assert!(err.to_string().contains("'admin'"));
    }
}
