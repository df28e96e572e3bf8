//! The session engine: one connection to a listener / database server, the handshake, and the
//!  logical message stream on top of Data packets.
//!
//! Outbound values are collected in a buffer with the `put_*` functions and sent with
//!  [Session::write], which cuts the buffer into Data packets of at most `SDU - 20` bytes.
//!  Inbound values are decoded with the `get_*` functions, which pull Data packets from the
//!  connection as needed, so callers never see packet boundaries.
//!
//! A [Session] is a single-owner handle: every operation takes `&mut self`, and the protocol
//!  has exactly one logical exchange in flight at any time. Cancellation from another task
//!  goes through [AbortHandle].

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use bytes::{Bytes, BytesMut};
use tracing::debug;
use crate::config::ConnectionOption;
use crate::error::{OracleError, TnsError};
use crate::strconv::{LossyUtf8, StringConverter};
use crate::summary::Summary;
use crate::trace::{NilTracer, Tracer};

mod connection;
mod context;
mod handshake;
mod marker;
mod packet_io;
mod primitives;

pub use connection::{AbortHandle, Dialer, TcpDialer, TnsStream};
#[cfg(test)] pub use connection::MockDialer;
pub use context::SessionContext;
pub use primitives::Data;

use connection::Connection;

/// Snapshot for speculative protocol steps, see [Session::save_state]
struct SessionState {
    summary: Option<Summary>,
    send_pcks: Vec<Bytes>,
    in_buffer: Bytes,
    out_buffer: Bytes,
    index: usize,
}

pub struct Session {
    pub context: SessionContext,
    /// Set by the layers above once the corresponding TTC capabilities are negotiated. They
    ///  change the layout of [Summary].
    pub has_eos_capability: bool,
    pub has_fsap_capability: bool,

    option: ConnectionOption,
    dialer: Arc<dyn Dialer>,
    tracer: Arc<dyn Tracer>,
    str_conv: Arc<dyn StringConverter>,
    abort_handle: AbortHandle,
    connection: Option<Connection>,

    out_buffer: BytesMut,
    in_buffer: BytesMut,
    index: usize,
    /// every packet written for the current logical exchange, replayed on RESEND
    send_pcks: Vec<Bytes>,
    summary: Option<Summary>,
    states: Vec<SessionState>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("addr", &self.option.dial_addr())
            .field("connected", &self.connection.is_some())
            .field("context", &self.context)
            .field("in_buffer", &self.in_buffer.len())
            .field("index", &self.index)
            .field("out_buffer", &self.out_buffer.len())
            .finish()
    }
}

impl Session {
    pub fn new(option: ConnectionOption) -> anyhow::Result<Session> {
        option.validate()?;

        Ok(Session {
            context: SessionContext::new(&option),
            has_eos_capability: false,
            has_fsap_capability: false,
            option,
            dialer: Arc::new(TcpDialer),
            tracer: Arc::new(NilTracer),
            str_conv: Arc::new(LossyUtf8),
            abort_handle: AbortHandle::new(),
            connection: None,
            out_buffer: BytesMut::new(),
            in_buffer: BytesMut::new(),
            index: 0,
            send_pcks: Vec::new(),
            summary: None,
            states: Vec::new(),
        })
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Session {
        self.dialer = dialer;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Session {
        self.tracer = tracer;
        self
    }

    pub fn with_string_converter(mut self, str_conv: Arc<dyn StringConverter>) -> Session {
        self.str_conv = str_conv;
        self
    }

    /// Pre-fills the inbound buffer, for decoding captured traffic without a connection
    pub fn with_input_buffer(mut self, data: &[u8]) -> Session {
        self.in_buffer = BytesMut::from(data);
        self.index = 0;
        self
    }

    pub fn connection_option(&self) -> &ConnectionOption {
        &self.option
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Aborts and closes the session. Use [Session::abort_handle] to do this from another task
    ///  while an operation is pending.
    pub fn abort(&mut self) {
        self.abort_handle.abort();
        self.connection = None;
    }

    fn ensure_not_aborted(&self) -> anyhow::Result<()> {
        if self.abort_handle.is_aborted() {
            return Err(TnsError::Aborted.into());
        }
        Ok(())
    }

    /// Clears all per-exchange state. Callers do this between logical requests.
    pub fn reset_buffer(&mut self) {
        self.summary = None;
        self.send_pcks.clear();
        self.in_buffer.clear();
        self.out_buffer.clear();
        self.index = 0;
    }

    /// Pushes a snapshot of the buffers, the read position, the sent-packet log and the summary
    pub fn save_state(&mut self) -> anyhow::Result<()> {
        let limit = self.option.limits.max_saved_states;
        if self.states.len() >= limit {
            return Err(TnsError::ProtocolExhausted { what: "saved session states", limit }.into());
        }

        self.states.push(SessionState {
            summary: self.summary.clone(),
            send_pcks: self.send_pcks.clone(),
            in_buffer: Bytes::copy_from_slice(&self.in_buffer),
            out_buffer: Bytes::copy_from_slice(&self.out_buffer),
            index: self.index,
        });
        Ok(())
    }

    /// Restores the most recent snapshot. Returns `false` if there is none.
    pub fn load_state(&mut self) -> bool {
        match self.states.pop() {
            Some(state) => {
                self.summary = state.summary;
                self.send_pcks = state.send_pcks;
                self.in_buffer = BytesMut::from(state.in_buffer.as_ref());
                self.out_buffer = BytesMut::from(state.out_buffer.as_ref());
                self.index = state.index;
                true
            }
            None => {
                debug!("no saved session state to restore");
                false
            }
        }
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.summary.as_ref()
            .is_some_and(|s| s.ret_code != 0)
    }

    /// The error message of the last summary, empty if there was no error
    pub fn get_error(&self) -> String {
        match &self.summary {
            Some(summary) if summary.ret_code != 0 => self.str_conv.decode(&summary.error_message),
            _ => String::new(),
        }
    }

    pub fn oracle_error(&self) -> Option<OracleError> {
        let summary = self.summary.as_ref()?;
        if summary.ret_code == 0 {
            return None;
        }
        Some(OracleError {
            code: summary.ret_code,
            message: self.get_error(),
        })
    }
}
