//! # nad-protocol
//!
//! Wire protocol for NAD AV receivers: command encoding, line framing, and
//! push-message parsing.
//!
//! This crate is pure data manipulation.  It has zero dependencies on
//! sockets, serial ports, or the async runtime, which keeps every rule of
//! the protocol unit-testable without hardware.
//!
//! # The protocol (for beginners)
//!
//! NAD receivers expose the same textual protocol on their Telnet port and
//! on their RS-232 jack.  The receiver *pushes* a line whenever any of its
//! settings changes, including changes it makes in response to a command:
//!
//! ```text
//! Main.Volume=-50
//! Main.Power=On
//! Source3.Name=CD
//! ```
//!
//! The client sends commands of the form `Key<operator>[value]`, wrapped in
//! a leading and trailing carriage return:
//!
//! ```text
//! \rMain.Power?\r          query the power state
//! \rMain.Volume=-42\r      set the volume
//! \rMain.Volume+\r         nudge the volume up one step
//! ```
//!
//! There is no request/response correlation on the wire: the answer to a
//! query arrives as an ordinary push line, indistinguishable from an
//! unsolicited update.
//!
//! This crate defines:
//!
//! - **[`Command`] / [`Operator`]** – typed command construction and the
//!   `\r...\r` wire encoding.
//! - **[`LineFramer`]** – turns an arbitrary stream of byte chunks into
//!   complete lines, no matter where the chunk boundaries fall.
//! - **[`Message`]** – a parsed `Key=Value` pair.

pub mod command;
pub mod framer;
pub mod message;

pub use command::{Command, Operator, ProtocolError};
pub use framer::LineFramer;
pub use message::Message;
