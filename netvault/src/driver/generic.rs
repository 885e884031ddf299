//! SSH session driven by a platform definition.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::time::Instant;

use super::Session;
use super::response::Response;
use crate::channel::{DEFAULT_SEARCH_DEPTH, PtyChannel};
use crate::error::{DriverError, Result};
use crate::platform::{PlatformDefinition, normalize_output};
use crate::transport::{SshConfig, SshTransport};

/// Prompt-driven session over an SSH PTY.
///
/// Handles command execution with prompt detection, output normalization
/// and failure-pattern checks for any platform definition.
pub struct GenericDriver {
    /// Platform definition.
    platform: Arc<PlatformDefinition>,

    /// SSH transport (None once closed).
    transport: Option<SshTransport>,

    /// Interactive shell channel (None once closed).
    channel: Option<PtyChannel>,

    /// Timeout for reading a prompt.
    timeout: Duration,
}

impl GenericDriver {
    /// Connect, open a shell and wait for the first prompt.
    pub async fn open(ssh_config: SshConfig, platform: Arc<PlatformDefinition>) -> Result<Self> {
        let timeout = ssh_config.timeout;
        let transport = SshTransport::connect(ssh_config).await?;
        let mut channel = PtyChannel::new(transport.open_channel().await?, DEFAULT_SEARCH_DEPTH);

        let banner = channel.read_until(&platform.prompt_pattern, timeout).await?;
        debug!(
            "{}: session open ({} bytes before first prompt)",
            transport.host(),
            banner.len()
        );

        Ok(Self {
            platform,
            transport: Some(transport),
            channel: Some(channel),
            timeout,
        })
    }

    async fn exchange(&mut self, command: &str, settle: Option<Duration>) -> Result<Response> {
        let channel = self.channel.as_mut().ok_or(DriverError::NotConnected)?;
        let start = Instant::now();

        channel.discard_pending();
        channel.send_line(command).await?;
        if let Some(settle) = settle {
            trace!("settling {:?} after {:?}", settle, command);
            tokio::time::sleep(settle).await;
        }

        let data = channel
            .read_until(&self.platform.prompt_pattern, self.timeout)
            .await?;
        trace!("{:?} answered in {:?}", command, start.elapsed());
        let raw = String::from_utf8_lossy(&data);
        let response = Response::new(command, normalize_output(&raw, command));
        match self.platform.detect_failure(&response.result) {
            Some(pattern) => {
                let pattern = pattern.to_string();
                Ok(response.with_failure(pattern))
            }
            None => Ok(response),
        }
    }
}

impl Session for GenericDriver {
    async fn send_command(&mut self, command: &str) -> Result<Response> {
        self.exchange(command, None).await
    }

    async fn send_command_settled(&mut self, command: &str, settle: Duration) -> Result<Response> {
        self.exchange(command, Some(settle)).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut channel) = self.channel.take() {
            // The device may already have dropped the channel
            if let Err(e) = channel.close().await {
                debug!("channel close: {}", e);
            }
        }
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }
}
