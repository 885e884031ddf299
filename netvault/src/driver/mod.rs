//! Device sessions and vendor dispatch.
//!
//! A [`Connector`] opens authenticated [`Session`]s; a [`VendorDriver`]
//! runs the vendor's retrieval protocol over a session. The SSH
//! implementation is [`SshConnector`] / [`GenericDriver`]; tests plug in
//! scripted sessions through the same traits.

mod connector;
mod generic;
mod profile;
mod response;
mod step;
mod vendor;

pub use connector::SshConnector;
pub use generic::GenericDriver;
pub use profile::{ConnectTarget, ConnectionProfile};
pub use response::Response;
pub use step::StepGuard;
pub use vendor::{DriverVariant, FetchedUnit, VendorDriver};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// An open, authenticated command-line session.
pub trait Session: Send {
    /// Send a command and wait for the prompt.
    fn send_command(&mut self, command: &str) -> impl Future<Output = Result<Response>> + Send;

    /// Send a command, wait `settle`, then read through the prompt.
    ///
    /// For CLIs whose output arrives asynchronously to the command echo.
    fn send_command_settled(
        &mut self,
        command: &str,
        settle: Duration,
    ) -> impl Future<Output = Result<Response>> + Send;

    /// Close the session and release the connection.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens sessions to devices.
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Connect and authenticate.
    fn connect(
        &self,
        target: ConnectTarget<'_>,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}
