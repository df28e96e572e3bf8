use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};
use crate::error::TnsError;
use crate::packet::{DataPacket, MarkerPacket, Packet, PacketType, TnsPacket, HEADER_LEN};
use crate::session::Session;
use crate::util::safe_converter::SafeCast;

impl Session {
    fn connection_mut(&mut self) -> anyhow::Result<&mut super::Connection> {
        self.ensure_not_aborted()?;
        self.connection.as_mut()
            .ok_or_else(|| TnsError::NotConnected.into())
    }

    /// An aborted session drops its socket right away
    fn check_io<T>(&mut self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        if let Err(e) = &result {
            if matches!(TnsError::of(e), Some(TnsError::Aborted)) {
                self.connection = None;
            }
        }
        result
    }

    async fn write_raw(&mut self, packet: &[u8]) -> anyhow::Result<()> {
        self.tracer.log_packet("Write packet:", packet);
        let result = self.connection_mut()?.write_all(packet).await;
        self.check_io(result)
    }

    /// Sends a packet and records it for RESEND replay
    pub(crate) async fn write_packet(&mut self, packet: Bytes) -> anyhow::Result<()> {
        self.send_pcks.push(packet.clone());
        self.write_raw(&packet).await
    }

    /// Sends the outbound buffer as Data packets of at most `SDU - 20` bytes each, or a single
    ///  empty Data packet if the buffer is empty. The buffer is kept after success; on failure
    ///  it is discarded.
    pub async fn write(&mut self) -> anyhow::Result<()> {
        if self.out_buffer.is_empty() {
            return self.write_packet(DataPacket::new(0, Bytes::new()).to_bytes()).await;
        }

        let segment_len = self.context.max_segment_len();
        let out = Bytes::copy_from_slice(&self.out_buffer);
        trace!(len = out.len(), segment_len, "writing logical message");

        for offset in (0..out.len()).step_by(segment_len) {
            let segment = out.slice(offset..(offset + segment_len).min(out.len()));
            if let Err(e) = self.write_packet(DataPacket::new(0, segment).to_bytes()).await {
                self.out_buffer.clear();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Tells the server that the client closes the session
    pub async fn write_final_packet(&mut self) -> anyhow::Result<()> {
        self.write_packet(DataPacket::new(DataPacket::FLAG_EOF, Bytes::new()).to_bytes()).await
    }

    /// Sends an interrupt marker, asking the server to cancel the current call. The server
    ///  answers with a break / reset marker sequence that the next read handles.
    pub async fn break_connection(&mut self) -> anyhow::Result<()> {
        debug!("sending interrupt marker");
        self.write_packet(MarkerPacket::new(MarkerPacket::DATA_INTERRUPT).to_bytes()).await
    }

    /// Reads one complete raw packet. RESEND requests are answered by replaying the current
    ///  exchange's packets, up to the configured number of times.
    pub(crate) async fn read_packet_data(&mut self) -> anyhow::Result<Bytes> {
        let mut num_replays = 0;
        loop {
            let mut header = [0u8; HEADER_LEN];
            let result = self.connection_mut()?.read_exact(&mut header).await;
            self.check_io(result)?;

            let length: usize = u16::from_be_bytes([header[0], header[1]]).safe_cast();
            if length < HEADER_LEN {
                return Err(TnsError::Framing(format!("packet length {} is shorter than the packet header", length)).into());
            }

            let mut raw = BytesMut::zeroed(length);
            raw[..HEADER_LEN].copy_from_slice(&header);
            let result = self.connection_mut()?.read_exact(&mut raw[HEADER_LEN..]).await;
            self.check_io(result)?;

            if header[4] == u8::from(PacketType::Resend) {
                num_replays += 1;
                let limit = self.option.limits.max_resend_replays;
                if num_replays > limit {
                    return Err(TnsError::ProtocolExhausted { what: "RESEND replays", limit }.into());
                }
                debug!(num_packets = self.send_pcks.len(), "server requested RESEND, replaying the current exchange");
                for packet in self.send_pcks.clone() {
                    self.write_raw(&packet).await?;
                }
                continue;
            }

            let raw = raw.freeze();
            self.tracer.log_packet("Read packet:", &raw);
            return Ok(raw);
        }
    }

    /// Reads and parses the next packet. A Redirect without room for its data is completed
    ///  from the Data packet that follows it.
    pub(crate) async fn read_packet(&mut self) -> anyhow::Result<Packet> {
        let raw = self.read_packet_data().await?;
        match Packet::parse(&raw)? {
            Packet::Redirect(mut redirect) if redirect.is_payload_deferred() => {
                let raw = self.read_packet_data().await?;
                let data = DataPacket::deser(&raw)?;
                redirect.attach_payload(&data.buffer);
                Ok(Packet::Redirect(redirect))
            }
            packet => Ok(packet),
        }
    }

    /// Appends the next Data packet's payload to the inbound buffer. Marker sequences are
    ///  handled on the way, which may replace the inbound buffer.
    pub(crate) async fn receive(&mut self) -> anyhow::Result<()> {
        match self.read_packet().await? {
            Packet::Data(data) => {
                if data.data_flag == DataPacket::FLAG_EOF {
                    debug!("server closed the session");
                    self.disconnect().await;
                    return Err(TnsError::ConnectionClosed.into());
                }
                self.in_buffer.extend_from_slice(&data.buffer);
                Ok(())
            }
            Packet::Marker(marker) => self.handle_marker(marker).await,
            other => Err(TnsError::Protocol(format!("expected a data packet, received {:?}", other.packet_type())).into()),
        }
    }
}
