//! Typed command construction and wire encoding.
//!
//! A command is `Key<operator>[value]`.  The four operators:
//!
//! | Operator | Symbol | Meaning                         |
//! |----------|--------|---------------------------------|
//! | Query    | `?`    | ask for the current value       |
//! | Set      | `=`    | set the value                   |
//! | Increment| `+`    | step the value up               |
//! | Decrement| `-`    | step the value down             |
//!
//! On the wire every command is wrapped in a leading and trailing carriage
//! return (`\r`), on both the TCP and the serial transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for protocol-level parsing failures.
///
/// Malformed *inbound* lines are deliberately not an error anywhere in this
/// crate: receivers emit banner and diagnostic lines outside the key-value
/// grammar, and those are discarded, not rejected.  The only thing that can
/// fail is turning caller-supplied text into a typed [`Operator`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The operator symbol is not one of `?`, `=`, `+`, `-`.
    #[error("unknown command operator: {0:?}")]
    UnknownOperator(String),
}

/// The four command operators of the NAD protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `?` – query the current value.
    Query,
    /// `=` – set the value.
    Set,
    /// `+` – increment by one step.
    Increment,
    /// `-` – decrement by one step.
    Decrement,
}

impl Operator {
    /// Returns the single-character wire symbol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Query => "?",
            Operator::Set => "=",
            Operator::Increment => "+",
            Operator::Decrement => "-",
        }
    }

    /// Returns `true` for operators that change receiver state.
    ///
    /// Queries only read; set/increment/decrement cause the receiver to push
    /// an updated value, which callers may want to wait for.
    pub fn mutates_state(&self) -> bool {
        !matches!(self, Operator::Query)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "?" => Ok(Operator::Query),
            "=" => Ok(Operator::Set),
            "+" => Ok(Operator::Increment),
            "-" => Ok(Operator::Decrement),
            other => Err(ProtocolError::UnknownOperator(other.to_string())),
        }
    }
}

/// A single outbound command.
///
/// Commands are transient: build one, serialize it with [`Command::to_wire`],
/// write the bytes, drop it.  Nothing in the protocol layer retains sent
/// commands or correlates them with responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Dotted key, e.g. `"Main.Volume"`.
    pub key: String,
    /// The operator to apply.
    pub operator: Operator,
    /// Optional value, appended verbatim after the operator.
    pub value: Option<String>,
}

impl Command {
    /// Creates a command with an explicit operator and optional value.
    pub fn new(key: impl Into<String>, operator: Operator, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            value,
        }
    }

    /// Creates a `Key?` query.
    pub fn query(key: impl Into<String>) -> Self {
        Self::new(key, Operator::Query, None)
    }

    /// Creates a `Key=Value` set command.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Operator::Set, Some(value.into()))
    }

    /// Creates a `Key+` or `Key-` step command.
    pub fn adjust(key: impl Into<String>, operator: Operator) -> Self {
        Self::new(key, operator, None)
    }

    /// Serializes to the bare command text `key<op>[value]`.
    ///
    /// An empty value string is treated the same as no value, mirroring the
    /// receiver's own tolerance.
    pub fn encode(&self) -> String {
        match self.value.as_deref() {
            Some(v) if !v.is_empty() => format!("{}{}{}", self.key, self.operator, v),
            _ => format!("{}{}", self.key, self.operator),
        }
    }

    /// Serializes to the on-wire byte form: `\r` + command + `\r`.
    pub fn to_wire(&self) -> Vec<u8> {
        format!("\r{}\r", self.encode()).into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
