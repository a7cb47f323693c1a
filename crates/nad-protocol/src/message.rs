//! Parsing of inbound `Key=Value` push lines.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One parsed push message.
///
/// Messages are ephemeral: the client hands ownership to its message
/// callback immediately and retains nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Dotted key, e.g. `"Main.Volume"`.
    pub key: String,
    /// Raw value text; interpretation belongs to the consumer.
    pub value: String,
}

impl Message {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parses one framed line into a message.
    ///
    /// Splits on the FIRST `=` only, so the value may itself contain `=`.
    /// Empty lines and lines without `=` (banners, diagnostics) yield `None`
    /// and are logged at debug level; they are never an error.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match line.split_once('=') {
            Some((key, value)) => Some(Self::new(key, value)),
            None => {
                debug!("discarding non key-value line: {line:?}");
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
