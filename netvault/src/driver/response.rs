//! Response type for command execution results.

/// Response from a command execution.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command that was executed.
    pub command: String,

    /// The command output (normalized - command echo and trailing prompt removed).
    pub result: String,

    /// Failure message if the command failed (based on failure patterns).
    pub failure_message: Option<String>,
}

impl Response {
    /// Create a new successful response.
    pub fn new(command: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            result: result.into(),
            failure_message: None,
        }
    }

    /// Mark the response as failed with the matched failure pattern.
    pub fn with_failure(mut self, failure_message: impl Into<String>) -> Self {
        self.failure_message = Some(failure_message.into());
        self
    }
}
