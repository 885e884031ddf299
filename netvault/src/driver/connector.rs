//! SSH connector.

use secrecy::{ExposeSecret, SecretString};

use super::profile::ConnectTarget;
use super::{Connector, GenericDriver};
use crate::error::Result;
use crate::transport::{SshConfig, SshOptions};

/// Opens [`GenericDriver`] sessions over SSH.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    fn ssh_config(&self, target: &ConnectTarget<'_>) -> SshConfig {
        SshConfig {
            host: target.device.address.clone(),
            port: target.device.port,
            username: target.credential.username.clone(),
            password: SecretString::from(target.credential.secret.expose_secret().to_string()),
            timeout: target.timeout,
            terminal_width: target.platform.terminal_width,
            terminal_height: target.platform.terminal_height,
            options: self.options.clone(),
        }
    }
}

impl Connector for SshConnector {
    type Session = GenericDriver;

    async fn connect(&self, target: ConnectTarget<'_>) -> Result<GenericDriver> {
        let config = self.ssh_config(&target);
        GenericDriver::open(config, target.platform.clone()).await
    }
}
