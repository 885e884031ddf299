//! Session results and the failure taxonomy.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::artifact::ArtifactName;
use crate::error::{ChannelError, DriverError, Error, TransportError};

/// Log target of the per-result structured record.
pub const SESSION_LOG_TARGET: &str = "netvault::session";

/// Sub-kind of a retrieval failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalKind {
    /// A step exceeded the vendor's timeout.
    Timeout,
    /// The device answered with an error (failure pattern in the output).
    Command,
    /// The session was lost; the unit was cut short or never attempted.
    PartialOutput,
}

/// Why a unit of work failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network reachability or authentication.
    Connect,
    /// Authenticated, but retrieving the configuration failed.
    Retrieval(RetrievalKind),
    /// The sink rejected the artifact.
    Sink,
    /// The run was cancelled before the unit completed.
    Cancelled,
    /// Pre-flight validation failed.
    Validation,
}

/// Session phase an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connecting and authenticating.
    Open,
    /// Running commands on an authenticated session.
    Fetch,
}

impl FailureKind {
    /// Map a library error onto the taxonomy.
    pub fn classify(err: &Error, phase: Phase) -> Self {
        match err {
            Error::Driver(DriverError::Cancelled) => Self::Cancelled,
            Error::Driver(DriverError::Timeout(_))
            | Error::Channel(ChannelError::PatternTimeout(_))
            | Error::Transport(TransportError::Timeout(_)) => {
                Self::Retrieval(RetrievalKind::Timeout)
            }
            Error::Sink(_) => Self::Sink,
            Error::Config(_) => Self::Validation,
            _ if phase == Phase::Open => Self::Connect,
            Error::Driver(DriverError::CommandFailed { .. }) | Error::Platform(_) => {
                Self::Retrieval(RetrievalKind::Command)
            }
            _ => Self::Retrieval(RetrievalKind::PartialOutput),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Retrieval(RetrievalKind::Timeout) => "timeout",
            Self::Retrieval(RetrievalKind::Command) => "command",
            Self::Retrieval(RetrievalKind::PartialOutput) => "partial_output",
            Self::Sink => "sink",
            Self::Cancelled => "cancelled",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with an operator-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify an error raised in `phase`.
    pub fn from_error(err: &Error, phase: Phase) -> Self {
        Self::new(FailureKind::classify(err, phase), err.to_string())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Outcome of one retrieval unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The artifact reached the sink.
    Success { artifact: ArtifactName, size: usize },
    Failure(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure kind, if this is a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.kind),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure(failure) => failure.kind.as_str(),
        }
    }
}

/// Account of one (device, context) pair in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    pub device_id: String,
    pub context_name: Option<String>,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
}

impl SessionResult {
    pub fn new(
        device_id: impl Into<String>,
        context_name: Option<String>,
        outcome: Outcome,
        duration: Duration,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            context_name,
            outcome,
            timestamp: Utc::now(),
            duration,
        }
    }

    /// Emit the structured record for this result.
    pub fn log(&self) {
        let context = self.context_name.as_deref().unwrap_or("-");
        let duration_ms = u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX);
        match self.outcome {
            Outcome::Success { ref artifact, size } => info!(
                target: SESSION_LOG_TARGET,
                device = self.device_id.as_str(),
                context = context,
                outcome = "success",
                duration_ms = duration_ms;
                "{} {}: stored {} ({} bytes)", self.device_id, context, artifact, size
            ),
            Outcome::Failure(ref failure) => warn!(
                target: SESSION_LOG_TARGET,
                device = self.device_id.as_str(),
                context = context,
                outcome = failure.kind.as_str(),
                duration_ms = duration_ms;
                "{} {}: {}", self.device_id, context, failure.detail
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SinkError};

    #[test]
    fn test_classify_open_phase() {
        let auth: Error = TransportError::AuthenticationFailed {
            user: "netops".to_string(),
        }
        .into();
        assert_eq!(FailureKind::classify(&auth, Phase::Open), FailureKind::Connect);

        let timeout: Error = DriverError::Timeout(Duration::from_secs(90)).into();
        assert_eq!(
            FailureKind::classify(&timeout, Phase::Open),
            FailureKind::Retrieval(RetrievalKind::Timeout)
        );

        let cancelled: Error = DriverError::Cancelled.into();
        assert_eq!(
            FailureKind::classify(&cancelled, Phase::Open),
            FailureKind::Cancelled
        );
    }

    #[test]
    fn test_classify_fetch_phase() {
        let command: Error = DriverError::CommandFailed {
            command: "changeto context DMZ".to_string(),
            message: "ERROR:".to_string(),
        }
        .into();
        assert_eq!(
            FailureKind::classify(&command, Phase::Fetch),
            FailureKind::Retrieval(RetrievalKind::Command)
        );

        let closed: Error = ChannelError::Closed.into();
        assert_eq!(
            FailureKind::classify(&closed, Phase::Fetch),
            FailureKind::Retrieval(RetrievalKind::PartialOutput)
        );

        let pattern: Error = ChannelError::PatternTimeout(Duration::from_secs(5)).into();
        assert_eq!(
            FailureKind::classify(&pattern, Phase::Fetch),
            FailureKind::Retrieval(RetrievalKind::Timeout)
        );

        let sink: Error = SinkError::Unreachable("10.0.0.5".to_string()).into();
        assert_eq!(FailureKind::classify(&sink, Phase::Fetch), FailureKind::Sink);

        let config: Error = ConfigError::Invalid {
            message: "x".to_string(),
        }
        .into();
        assert_eq!(
            FailureKind::classify(&config, Phase::Open),
            FailureKind::Validation
        );
    }

    #[test]
    fn test_outcome_labels() {
        let failure = Outcome::Failure(Failure::new(
            FailureKind::Retrieval(RetrievalKind::PartialOutput),
            "not attempted",
        ));
        assert_eq!(failure.label(), "partial_output");
        assert!(!failure.is_success());
        assert_eq!(
            failure.failure_kind(),
            Some(FailureKind::Retrieval(RetrievalKind::PartialOutput))
        );
    }
}
