use bytes::BytesMut;
use tracing::{debug, warn};
use crate::codec::{DecodeError, TtcReader};
use crate::error::TnsError;
use crate::packet::{DataPacket, MarkerPacket, Packet, TnsPacket};
use crate::session::Session;
use crate::summary::Summary;

/// Additional markers that are read while the server has not offered a reset yet
const MAX_BREAK_TRIALS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerAction {
    Break,
    Reset,
}

impl MarkerAction {
    fn of(marker: &MarkerPacket) -> anyhow::Result<MarkerAction> {
        match (marker.marker_type, marker.marker_data) {
            (MarkerPacket::TYPE_BREAK, _) => Ok(MarkerAction::Break),
            (MarkerPacket::TYPE_RESET_CAPABLE, MarkerPacket::DATA_RESET) => Ok(MarkerAction::Reset),
            (MarkerPacket::TYPE_RESET_CAPABLE, _) => Ok(MarkerAction::Break),
            (marker_type, _) => Err(TnsError::MarkerProtocol(format!("unknown marker type {}", marker_type)).into()),
        }
    }
}

impl Session {
    /// Runs the break / reset sequence that starts with `first`. On success the inbound buffer
    ///  holds the first Data packet after the reset, positioned behind the summary if the
    ///  server sent one. A summary with an error is returned as [TnsError::Server].
    ///
    /// Every failure except a server error leaves the session disconnected.
    pub(crate) async fn handle_marker(&mut self, first: MarkerPacket) -> anyhow::Result<()> {
        let result = self.break_and_reset(first).await;
        if let Err(e) = &result {
            if !matches!(TnsError::of(e), Some(TnsError::Server(_))) {
                warn!("marker sequence failed: {}", e);
                self.disconnect().await;
            }
        }
        result
    }

    async fn break_and_reset(&mut self, first: MarkerPacket) -> anyhow::Result<()> {
        let mut marker = first;
        let mut num_trials = 0;
        while MarkerAction::of(&marker)? == MarkerAction::Break {
            if num_trials == MAX_BREAK_TRIALS {
                return Err(TnsError::MarkerProtocol("connection break".to_string()).into());
            }
            num_trials += 1;

            let raw = self.read_packet_data().await?;
            marker = match Packet::parse(&raw)? {
                Packet::Marker(marker) => marker,
                other => return Err(TnsError::MarkerProtocol(format!("connection break: received {:?} packet while waiting for a reset marker", other.packet_type())).into()),
            };
        }

        debug!(num_trials, "server offers a reset, acknowledging");
        self.tracer.print("Reset connection");
        self.reset_buffer();
        self.write_packet(MarkerPacket::new(MarkerPacket::DATA_RESET).to_bytes()).await?;

        let data = self.read_data_after_reset().await?;
        self.in_buffer = BytesMut::from(data.buffer.as_ref());
        self.index = 0;
        self.context.got_reset = true;

        if self.in_buffer.first() == Some(&Summary::MESSAGE_CODE) {
            self.read_reset_summary().await?;
        }
        Ok(())
    }

    async fn read_data_after_reset(&mut self) -> anyhow::Result<DataPacket> {
        let raw = self.read_packet_data().await?;
        match Packet::parse(&raw)? {
            Packet::Data(data) => Ok(data),
            other => Err(TnsError::MarkerProtocol(format!("expected a data packet after reset, received {:?}", other.packet_type())).into()),
        }
    }

    async fn read_reset_summary(&mut self) -> anyhow::Result<()> {
        loop {
            let mut reader = TtcReader::new(&self.in_buffer, 1);
            match Summary::decode(&mut reader, self.has_eos_capability, self.has_fsap_capability) {
                Ok(summary) => {
                    self.index = reader.position();
                    self.summary = Some(summary);
                    break;
                }
                Err(DecodeError::NeedMore) => {
                    let data = self.read_data_after_reset().await?;
                    self.in_buffer.extend_from_slice(&data.buffer);
                }
                Err(DecodeError::Invalid(msg)) => return Err(TnsError::Protocol(format!("invalid summary after reset: {}", msg)).into()),
            }
        }

        match self.oracle_error() {
            Some(err) => {
                debug!(code = err.code, "reset summary carries a server error");
                Err(TnsError::Server(err).into())
            }
            None => Ok(()),
        }
    }
}
