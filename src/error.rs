//! Unified error handling for icbd-ng.
//!
//! The taxonomy mirrors how failures are surfaced to clients: command
//! rejections become `e` packets and abort only the current command,
//! protocol violations additionally tell the client to terminate, and
//! anything unexpected aborts the single offending connection.

use icb_proto::Packet;
use thiserror::Error;

use crate::db::DbError;
use crate::state::StateError;

/// Errors that can occur while handling a packet or command.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business-rule rejection: delivered as an `e` packet, the command is
    /// aborted, the session stays connected.
    #[error("{0}")]
    Command(String),

    /// Informational rejection: delivered as a `d` status packet rather than
    /// an error (e.g. "nick already in use" during a rename race).
    #[error("{category}: {text}")]
    Status {
        /// Status category shown to the client.
        category: String,
        /// Status text.
        text: String,
    },

    /// Malformed packet (wrong field count, bad tag, oversized field):
    /// the client gets an `e` packet plus a `g` quit telling it to
    /// terminate.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The client asked to disconnect, or the server decided to drop it.
    /// Teardown runs; nothing further is sent.
    #[error("session quit")]
    Quit,

    /// Database failure. Logged at error level and the connection is
    /// aborted with a generic message; details never reach the client.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// Any other unexpected failure during message processing.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Shorthand for a command rejection.
    pub fn command(text: impl Into<String>) -> Self {
        Self::Command(text.into())
    }

    /// Shorthand for a status-style rejection.
    pub fn status(category: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Status {
            category: category.into(),
            text: text.into(),
        }
    }

    /// Shorthand for a protocol violation.
    pub fn protocol(text: impl Into<String>) -> Self {
        Self::Protocol(text.into())
    }

    /// Whether this error requires aborting the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Quit | Self::Db(_) | Self::Internal(_))
    }

    /// Packets to deliver to the offending client, in order.
    ///
    /// Returns an empty vec for errors that have no client-visible reply;
    /// quit and internal failures get a generic message at the connection
    /// layer instead.
    pub fn to_replies(&self) -> Vec<Packet> {
        match self {
            Self::Command(text) => vec![Packet::error(text)],
            Self::Status { category, text } => vec![Packet::status(category, text)],
            Self::Protocol(text) => vec![Packet::error(text), Packet::exit()],
            Self::Quit | Self::Db(_) | Self::Internal(_) => Vec::new(),
        }
    }
}

impl From<StateError> for HandlerError {
    fn from(e: StateError) -> Self {
        // An action running against a session that is gone is an internal
        // race, not a client mistake.
        Self::Internal(e.to_string())
    }
}

/// Result type for packet and command handlers.
pub type HandlerResult = Result<(), HandlerError>;
