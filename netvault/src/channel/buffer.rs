//! Prompt buffer with tail-only searching.
//!
//! Configuration dumps run to megabytes while the prompt that terminates
//! them is a few bytes at the very end, so prompt detection only looks at
//! the last `search_depth` bytes of what has been received.

use regex::bytes::Regex;

/// Accumulates session output (ANSI-stripped) and finds the prompt at its tail.
#[derive(Debug)]
pub struct PatternBuffer {
    /// The accumulated output buffer.
    buffer: Vec<u8>,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let cleaned = strip_ansi_escapes::strip(data);
        self.buffer.extend_from_slice(&cleaned);
    }

    /// Find the last match of `pattern` in the tail of the buffer.
    ///
    /// Returns the absolute offset one past the end of the match.
    pub fn find_tail_end(&self, pattern: &Regex) -> Option<usize> {
        let start = self.tail_start();
        pattern
            .find_iter(&self.buffer[start..])
            .last()
            .map(|m| start + m.end())
    }

    /// Remove and return everything up to `end`, keeping the remainder.
    pub fn split_to(&mut self, end: usize) -> Vec<u8> {
        let end = end.min(self.buffer.len());
        let rest = self.buffer.split_off(end);
        std::mem::replace(&mut self.buffer, rest)
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn tail_start(&self) -> usize {
        self.buffer.len().saturating_sub(self.search_depth)
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
