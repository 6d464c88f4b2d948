//! Delta feed wire protocol
//!
//! Each complete frame on the feed is a UTF-8 JSON object:
//!
//! ```text
//! {"type": "add" | "delete", "domains": ["example.com", ...]}
//! ```
//!
//! Frames may arrive split across several fragments; [`FrameAssembler`]
//! joins them back together before [`DeltaMessage::from_frame`] decodes them.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;

/// Command carried by a delta frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaCommand {
    /// Insert the listed domains
    Add,
    /// Remove the listed domains
    Delete,
    /// Any other tag; never mutates the set
    Unknown(String),
}

impl DeltaCommand {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "add" => DeltaCommand::Add,
            "delete" => DeltaCommand::Delete,
            other => DeltaCommand::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for DeltaCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaCommand::Add => f.write_str("add"),
            DeltaCommand::Delete => f.write_str("delete"),
            DeltaCommand::Unknown(tag) => write!(f, "unknown({})", tag),
        }
    }
}

/// One decoded delta frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaMessage {
    /// What to do with `domains`
    pub command: DeltaCommand,
    /// Domains in wire order
    pub domains: Vec<String>,
}

#[derive(Deserialize)]
struct RawDelta {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    domains: Vec<String>,
}

impl DeltaMessage {
    /// Build an `add` message
    pub fn add<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: DeltaCommand::Add,
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a `delete` message
    pub fn delete<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: DeltaCommand::Delete,
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }

    /// Decode a complete frame
    ///
    /// Fails with [`Error::MalformedFrame`] when the bytes are not UTF-8 or
    /// not a JSON object with a string `type`. Unknown tags decode fine and
    /// come back as [`DeltaCommand::Unknown`].
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| Error::malformed(format!("frame is not UTF-8: {}", e)))?;

        let raw: RawDelta = serde_json::from_str(text)
            .map_err(|e| Error::malformed(format!("frame is not a delta object: {}", e)))?;

        Ok(Self {
            command: DeltaCommand::from_tag(&raw.kind),
            domains: raw.domains,
        })
    }
}

/// Result of applying one delta to the domain set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Number of domains that were not yet present
    Added(usize),
    /// Number of domains that were present and got removed
    Removed(usize),
    /// Unknown command, set untouched
    Ignored,
}

/// Reassembles fragmented frames
///
/// The buffer keeps its allocation between frames.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
}

impl FrameAssembler {
    /// Create an assembler rejecting frames larger than `max_frame_bytes`
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Append a fragment
    ///
    /// Returns the complete frame once `end_of_message` is seen. The returned
    /// bytes are taken out of the buffer, leaving it empty for the next frame.
    pub fn push(&mut self, data: &[u8], end_of_message: bool) -> Result<Option<Vec<u8>>> {
        if self.buffer.len() + data.len() > self.max_frame_bytes {
            self.reset();
            return Err(Error::transport(format!(
                "frame exceeds {} bytes",
                self.max_frame_bytes
            )));
        }

        self.buffer.extend_from_slice(data);

        if !end_of_message {
            return Ok(None);
        }

        let frame = self.buffer.clone();
        self.buffer.clear();
        Ok(Some(frame))
    }

    /// Discard any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Bytes of the partial frame held so far
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
