//! Scripted connectors, sessions and sinks for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::artifact::Artifact;
use crate::driver::{ConnectTarget, Connector, Response, Session};
use crate::error::{ChannelError, Result, SinkError, TransportError};
use crate::sink::{ArtifactSink, MemorySink};

const HANG: Duration = Duration::from_secs(3600);

/// What a scripted session answers to one command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Clean output followed by a prompt.
    Output(String),
    /// Output that matched a failure pattern.
    Failed { output: String, pattern: String },
    /// The connection drops.
    Drop,
    /// No prompt ever comes back.
    Hang,
    /// Wait, then answer.
    Delayed(Duration, Box<Reply>),
    /// Cancel the run, then answer.
    Cancelling(CancellationToken, Box<Reply>),
}

impl Reply {
    pub fn output(output: impl Into<String>) -> Self {
        Self::Output(output.into())
    }

    pub fn failed(output: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Failed {
            output: output.into(),
            pattern: pattern.into(),
        }
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Self::Delayed(delay, Box::new(reply))
    }

    pub fn cancelling(cancel: &CancellationToken, reply: Reply) -> Self {
        Self::Cancelling(cancel.clone(), Box::new(reply))
    }
}

#[derive(Debug, Default)]
struct SessionLog {
    commands: Vec<String>,
    settled: Vec<String>,
    closed: bool,
}

/// In-memory session answering from a script.
///
/// Commands without a scripted reply succeed with a generic output.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    replies: HashMap<String, Reply>,
    log: Arc<Mutex<SessionLog>>,
    dropped: bool,
    active: Option<Arc<AtomicUsize>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: &str, reply: Reply) -> Self {
        self.replies.insert(command.to_string(), reply);
        self
    }

    /// Commands received, in order (including settled ones).
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().commands.clone()
    }

    /// Commands that were sent with a settle delay.
    pub fn settled(&self) -> Vec<String> {
        self.log.lock().unwrap().settled.clone()
    }

    async fn answer(&mut self, command: &str) -> Result<Response> {
        self.log.lock().unwrap().commands.push(command.to_string());
        if self.dropped {
            return Err(ChannelError::Closed.into());
        }

        let mut reply = self
            .replies
            .get(command)
            .cloned()
            .unwrap_or_else(|| Reply::Output(format!("! output of {}", command)));

        loop {
            match reply {
                Reply::Output(output) => {
                    return Ok(Response::new(command, output));
                }
                Reply::Failed { output, pattern } => {
                    return Ok(Response::new(command, output).with_failure(pattern));
                }
                Reply::Drop => {
                    self.dropped = true;
                    return Err(ChannelError::Closed.into());
                }
                Reply::Hang => {
                    tokio::time::sleep(HANG).await;
                    return Err(ChannelError::PatternTimeout(HANG).into());
                }
                Reply::Delayed(delay, next) => {
                    tokio::time::sleep(delay).await;
                    reply = *next;
                }
                Reply::Cancelling(cancel, next) => {
                    cancel.cancel();
                    reply = *next;
                }
            }
        }
    }
}

impl Session for ScriptedSession {
    async fn send_command(&mut self, command: &str) -> Result<Response> {
        self.answer(command).await
    }

    async fn send_command_settled(&mut self, command: &str, settle: Duration) -> Result<Response> {
        self.log.lock().unwrap().settled.push(command.to_string());
        tokio::time::sleep(settle).await;
        self.answer(command).await
    }

    async fn close(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if !log.closed {
            log.closed = true;
            if let Some(ref active) = self.active {
                active.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// How a scripted device answers the connection attempt.
#[derive(Debug, Clone)]
pub enum ConnectReply {
    Accept,
    Reject,
    Hang,
    Delayed(Duration),
    Cancelling(CancellationToken),
}

#[derive(Debug, Clone)]
struct DeviceScript {
    connect: ConnectReply,
    replies: HashMap<String, Reply>,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            connect: ConnectReply::Accept,
            replies: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    connects: Mutex<Vec<String>>,
    sessions: Mutex<Vec<(String, Arc<Mutex<SessionLog>>)>>,
    active: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

/// Connector handing out [`ScriptedSession`]s, keyed by device id.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    scripts: HashMap<String, DeviceScript>,
    state: Arc<ConnectorState>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a command reply for one device.
    pub fn reply(mut self, device_id: &str, command: &str, reply: Reply) -> Self {
        self.scripts
            .entry(device_id.to_string())
            .or_default()
            .replies
            .insert(command.to_string(), reply);
        self
    }

    /// Script the connection attempt for one device.
    pub fn on_connect(mut self, device_id: &str, connect: ConnectReply) -> Self {
        self.scripts.entry(device_id.to_string()).or_default().connect = connect;
        self
    }

    /// Device ids in the order their connections were attempted.
    pub fn connects(&self) -> Vec<String> {
        self.state.connects.lock().unwrap().clone()
    }

    /// Commands a device received across all its sessions.
    pub fn commands(&self, device_id: &str) -> Vec<String> {
        self.state
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == device_id)
            .flat_map(|(_, log)| log.lock().unwrap().commands.clone())
            .collect()
    }

    /// Whether every opened session was closed.
    pub fn all_closed(&self) -> bool {
        self.state
            .sessions
            .lock()
            .unwrap()
            .iter()
            .all(|(_, log)| log.lock().unwrap().closed)
    }

    /// Highest number of sessions open at once.
    pub fn peak_sessions(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(&self, target: ConnectTarget<'_>) -> Result<ScriptedSession> {
        let id = target.device.id.clone();
        self.state.connects.lock().unwrap().push(id.clone());

        let script = self.scripts.get(&id).cloned().unwrap_or_default();
        match script.connect {
            ConnectReply::Accept => {}
            ConnectReply::Reject => {
                return Err(TransportError::AuthenticationFailed {
                    user: target.credential.username.clone(),
                }
                .into());
            }
            ConnectReply::Hang => {
                tokio::time::sleep(HANG).await;
                return Err(TransportError::Timeout(HANG).into());
            }
            ConnectReply::Delayed(delay) => tokio::time::sleep(delay).await,
            ConnectReply::Cancelling(cancel) => cancel.cancel(),
        }

        let now = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(now, Ordering::SeqCst);

        let log = Arc::new(Mutex::new(SessionLog::default()));
        self.state
            .sessions
            .lock()
            .unwrap()
            .push((id, log.clone()));

        Ok(ScriptedSession {
            replies: script.replies,
            log,
            dropped: false,
            active: Some(self.state.active.clone()),
        })
    }
}

/// Memory sink that can be made unreachable or reject chosen artifacts.
#[derive(Debug, Default)]
pub struct FlakySink {
    inner: MemorySink,
    unreachable: bool,
    rejected_devices: HashSet<String>,
}

impl FlakySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Reject every artifact of a device.
    pub fn reject_device(mut self, device_id: &str) -> Self {
        self.rejected_devices.insert(device_id.to_string());
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.names()
    }
}

impl ArtifactSink for FlakySink {
    fn describe(&self) -> String {
        "flaky-memory".to_string()
    }

    async fn probe(&self) -> Result<()> {
        if self.unreachable {
            return Err(SinkError::Unreachable("backup server did not answer".to_string()).into());
        }
        self.inner.probe().await
    }

    async fn ingest(&self, artifact: Artifact) -> Result<()> {
        let rejected = self
            .rejected_devices
            .iter()
            .any(|id| artifact.name.as_str().starts_with(&format!("{}_", id)));
        if rejected {
            return Err(SinkError::Ingest {
                name: artifact.name.to_string(),
                message: "permission denied".to_string(),
            }
            .into());
        }
        self.inner.ingest(artifact).await
    }
}
