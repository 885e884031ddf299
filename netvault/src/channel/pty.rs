//! PTY channel for interactive device sessions.

use std::time::Duration;

use log::trace;
use regex::bytes::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::time::Instant;

use super::buffer::PatternBuffer;
use crate::error::{ChannelError, Result};

/// Default number of tail bytes searched for the prompt.
pub const DEFAULT_SEARCH_DEPTH: usize = 1000;

/// Interactive shell channel with prompt-terminated reads.
pub struct PtyChannel {
    /// The russh channel carrying the shell.
    channel: Channel<Msg>,

    /// Received output not yet consumed by a read.
    buffer: PatternBuffer,
}

impl PtyChannel {
    /// Wrap an open shell channel.
    pub fn new(channel: Channel<Msg>, search_depth: usize) -> Self {
        Self {
            channel,
            buffer: PatternBuffer::new(search_depth),
        }
    }

    /// Send one line of input.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        trace!("send: {:?}", line);
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.channel
            .data(&data[..])
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(())
    }

    /// Drop output received so far that no read has consumed.
    pub fn discard_pending(&mut self) {
        self.buffer.clear();
    }

    /// Read until `pattern` matches the tail of the received output.
    ///
    /// Returns everything up to and including the match; bytes received
    /// after the match stay buffered for the next read.
    pub async fn read_until(&mut self, pattern: &Regex, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(end) = self.buffer.find_tail_end(pattern) {
                return Ok(self.buffer.split_to(end));
            }

            let msg = tokio::time::timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| ChannelError::PatternTimeout(timeout))?;

            match msg {
                Some(ChannelMsg::Data { ref data }) => self.buffer.extend(data),
                Some(ChannelMsg::ExtendedData { ref data, .. }) => self.buffer.extend(data),
                Some(ChannelMsg::Eof | ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed.into());
                }
                Some(other) => trace!("ignoring channel message: {:?}", other),
            }
        }
    }

    /// Close the channel.
    pub async fn close(&mut self) -> Result<()> {
        self.channel.close().await.map_err(ChannelError::Ssh)?;
        Ok(())
    }
}
