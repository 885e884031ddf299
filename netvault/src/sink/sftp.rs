//! Upload to a backup server over SFTP.
//!
//! The sink keeps one authenticated SFTP session open for the whole run and
//! writes each artifact under a temporary name before renaming it into the
//! remote directory. A session that fails an upload is dropped; the next
//! artifact opens a fresh one.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info, warn};
use russh_sftp::client::SftpSession;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::ArtifactSink;
use crate::artifact::Artifact;
use crate::credentials::Credential;
use crate::error::{ConfigError, Result, SinkError};
use crate::transport::{SshConfig, SshOptions, SshTransport};

/// Credential domain of the backup server account.
pub const BACKUP_CREDENTIAL_DOMAIN: &str = "backup-server";

/// `[sftp]` section: where artifacts are uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SftpSettings {
    pub host: String,
    pub port: u16,

    /// Remote directory receiving the artifacts.
    pub remote_dir: String,

    /// Credential domain holding the server account.
    pub credential: String,

    pub timeout_secs: u64,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            remote_dir: ".".to_string(),
            credential: BACKUP_CREDENTIAL_DOMAIN.to_string(),
            timeout_secs: 30,
        }
    }
}

impl SftpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "sftp.host must be set".to_string(),
            }
            .into());
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "sftp.timeout_secs must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// File operations on an authenticated remote session.
pub trait RemoteSession: Send {
    /// Whether `path` exists and is a directory.
    fn is_dir(&mut self, path: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Create or truncate `path` and write `bytes` to it.
    fn write(&mut self, path: &str, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;

    fn rename(&mut self, from: &str, to: &str) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens [`RemoteSession`]s on the backup server.
pub trait RemoteConnector: Send + Sync {
    type Session: RemoteSession;

    /// `user@host:port` of the server.
    fn describe(&self) -> String;

    fn connect(&self) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// Connects to the backup server with russh and starts the `sftp` subsystem.
#[derive(Debug)]
pub struct SftpConnector {
    host: String,
    port: u16,
    credential: Credential,
    timeout: Duration,
    options: SshOptions,
}

impl SftpConnector {
    pub fn new(settings: &SftpSettings, credential: Credential, options: SshOptions) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            credential,
            timeout: settings.timeout(),
            options,
        }
    }

    fn ssh_config(&self) -> SshConfig {
        SshConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.credential.username.clone(),
            password: SecretString::from(self.credential.secret.expose_secret().to_string()),
            timeout: self.timeout,
            terminal_width: 80,
            terminal_height: 24,
            options: self.options.clone(),
        }
    }
}

impl RemoteConnector for SftpConnector {
    type Session = SftpClient;

    fn describe(&self) -> String {
        format!("{}@{}:{}", self.credential.username, self.host, self.port)
    }

    async fn connect(&self) -> Result<SftpClient> {
        let transport = SshTransport::connect(self.ssh_config()).await?;
        let channel = transport.open_subsystem("sftp").await?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(remote)?;
        debug!("SFTP session open on {}", transport.host());
        Ok(SftpClient {
            sftp,
            transport: Some(transport),
        })
    }
}

/// An SFTP session and the SSH connection carrying it.
pub struct SftpClient {
    sftp: SftpSession,
    transport: Option<SshTransport>,
}

fn remote(err: impl std::fmt::Display) -> SinkError {
    SinkError::Remote(err.to_string())
}

impl RemoteSession for SftpClient {
    async fn is_dir(&mut self, path: &str) -> Result<bool> {
        let attrs = self.sftp.metadata(path).await.map_err(remote)?;
        Ok(attrs.is_dir())
    }

    async fn write(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut file = self.sftp.create(path).await.map_err(remote)?;
        file.write_all(bytes).await.map_err(remote)?;
        file.shutdown().await.map_err(remote)?;
        Ok(())
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.sftp.rename(from, to).await.map_err(remote)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sftp.close().await.map_err(remote)?;
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }
}

/// Uploads artifacts into a directory on a remote server.
pub struct SftpSink<R: RemoteConnector> {
    connector: R,
    remote_dir: String,
    timeout: Duration,
    session: tokio::sync::Mutex<Option<R::Session>>,
    ingested: Mutex<HashSet<String>>,
}

impl SftpSink<SftpConnector> {
    /// Sink for the server described by `settings`.
    pub fn connect_with(settings: &SftpSettings, credential: Credential, options: SshOptions) -> Self {
        Self::new(
            SftpConnector::new(settings, credential, options),
            settings.remote_dir.clone(),
            settings.timeout(),
        )
    }
}

impl<R: RemoteConnector> SftpSink<R> {
    pub fn new(connector: R, remote_dir: impl Into<String>, timeout: Duration) -> Self {
        Self {
            connector,
            remote_dir: remote_dir.into(),
            timeout,
            session: tokio::sync::Mutex::new(None),
            ingested: Mutex::new(HashSet::new()),
        }
    }

    /// Remote path of a file in the target directory.
    pub fn remote_path(&self, name: &str) -> String {
        match self.remote_dir.trim_end_matches('/') {
            "" if self.remote_dir.starts_with('/') => format!("/{}", name),
            "" | "." => name.to_string(),
            dir => format!("{}/{}", dir, name),
        }
    }

    /// Close the open session, if any.
    pub async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            if let Err(e) = session.close().await {
                warn!("Error closing session to {}: {}", self.connector.describe(), e);
            }
        }
    }

    async fn open(&self) -> std::result::Result<R::Session, String> {
        match tokio::time::timeout(self.timeout, self.connector.connect()).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(format!("{}: {}", self.connector.describe(), e)),
            Err(_) => Err(format!(
                "{}: connect timed out after {:?}",
                self.connector.describe(),
                self.timeout
            )),
        }
    }

    fn claim(&self, name: &str) -> Result<()> {
        let mut ingested = self
            .ingested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !ingested.insert(name.to_string()) {
            return Err(SinkError::Duplicate(name.to_string()).into());
        }
        Ok(())
    }
}

async fn discard<S: RemoteSession>(mut session: S) {
    if let Err(e) = session.close().await {
        debug!("Ignoring close error on discarded session: {}", e);
    }
}

impl<R: RemoteConnector> ArtifactSink for SftpSink<R> {
    fn describe(&self) -> String {
        format!("sftp {}:{}", self.connector.describe(), self.remote_dir)
    }

    async fn probe(&self) -> Result<()> {
        let mut session = self.open().await.map_err(SinkError::Unreachable)?;

        let checked = tokio::time::timeout(self.timeout, session.is_dir(&self.remote_dir)).await;
        let problem = match checked {
            Ok(Ok(true)) => None,
            Ok(Ok(false)) => Some(format!("{} is not a directory", self.remote_dir)),
            Ok(Err(e)) => Some(format!("{}: {}", self.remote_dir, e)),
            Err(_) => Some(format!("{}: no answer within {:?}", self.remote_dir, self.timeout)),
        };
        if let Some(problem) = problem {
            discard(session).await;
            return Err(SinkError::Unreachable(problem).into());
        }

        if let Some(previous) = self.session.lock().await.replace(session) {
            discard(previous).await;
        }
        info!("Backup server {} ready", self.connector.describe());
        Ok(())
    }

    async fn ingest(&self, artifact: Artifact) -> Result<()> {
        let name = artifact.name.as_str();
        self.claim(name)?;
        let failed = |message: String| SinkError::Ingest {
            name: name.to_string(),
            message,
        };

        let mut slot = self.session.lock().await;
        let mut session = match slot.take() {
            Some(session) => session,
            None => self.open().await.map_err(failed)?,
        };

        let path = self.remote_path(name);
        let tmp = self.remote_path(&format!(".{}.tmp", name));
        let upload = async {
            session.write(&tmp, &artifact.bytes).await?;
            session.rename(&tmp, &path).await
        };

        match tokio::time::timeout(self.timeout, upload).await {
            Ok(Ok(())) => {
                *slot = Some(session);
                debug!("Uploaded {} ({} bytes)", path, artifact.len());
                Ok(())
            }
            Ok(Err(e)) => {
                discard(session).await;
                Err(failed(e.to_string()).into())
            }
            Err(_) => {
                discard(session).await;
                Err(failed(format!("upload timed out after {:?}", self.timeout)).into())
            }
        }
    }
}
