use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// Error kinds raised by the transport and session layer. Functions return `anyhow::Result`;
///  callers that need to branch on the kind use `err.downcast_ref::<TnsError>()`.
#[derive(Error, Debug)]
pub enum TnsError {
    #[error("framing error: {0}")]
    Framing(String),

    #[error("connection refused by the server (ORA-{code:05}): {message}")]
    Refused {
        code: u32,
        system_reason: u8,
        user_reason: u8,
        message: String,
    },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O timed out after {0:?}")]
    Timeout(Duration),

    #[error("session was aborted")]
    Aborted,

    #[error("session is not connected")]
    NotConnected,

    #[error("server closed the session")]
    ConnectionClosed,

    #[error("marker protocol error: {0}")]
    MarkerProtocol(String),

    #[error("{0}")]
    Server(OracleError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{what} exceeded the configured limit of {limit}")]
    ProtocolExhausted {
        what: &'static str,
        limit: usize,
    },
}

impl TnsError {
    /// Extracts the kind from an error chain, if the error originated in this crate
    pub fn of(err: &anyhow::Error) -> Option<&TnsError> {
        err.downcast_ref::<TnsError>()
    }
}

/// An error reported by the server through the summary of a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleError {
    pub code: i64,
    pub message: String,
}

impl Display for OracleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "ORA-{:05}", self.code)
        }
        else {
            write!(f, "{}", self.message.trim_end())
        }
    }
}

impl std::error::Error for OracleError {}
