use tracing::{debug, info, instrument, warn};
use crate::error::TnsError;
use crate::packet::{ConnectPacket, Packet, RedirectPacket, TnsPacket};
use crate::session::connection::{guarded, Connection};
use crate::session::{Session, SessionContext};

impl Session {
    /// Performs the handshake, following Redirect packets up to the configured limit. On
    ///  success the session context holds the parameters the server granted. Any failure leaves
    ///  the session disconnected.
    #[instrument(skip_all, fields(host = %self.option.host, port = self.option.port))]
    pub async fn connect(&mut self) -> anyhow::Result<()> {
        self.ensure_not_aborted()?;
        self.context = SessionContext::new(&self.option);

        let result = self.handshake().await;
        if let Err(e) = &result {
            debug!("handshake failed: {}", e);
            self.disconnect().await;
        }
        result
    }

    async fn handshake(&mut self) -> anyhow::Result<()> {
        let mut num_redirects = 0;
        loop {
            self.disconnect().await;
            self.reset_buffer();

            let addr = self.option.dial_addr();
            debug!(%addr, protocol = %self.option.protocol, "dialing");
            self.tracer.print(&format!("Connect to {}", addr));
            let mut abort = self.abort_handle.subscribe();
            let stream = guarded(&mut abort, self.option.connect_timeout, self.dialer.dial(&self.option.protocol, &addr)).await?;
            self.connection = Some(Connection::new(stream, self.abort_handle.subscribe(), self.option.io_timeout));

            self.send_connect().await?;

            match self.read_packet().await? {
                Packet::Accept(accept) => {
                    self.context = SessionContext::from_accept(&accept)?;
                    info!(version = self.context.version,
                        sdu = self.context.session_data_unit,
                        tdu = self.context.transport_data_unit,
                        "connection accepted");
                    return Ok(());
                }
                Packet::Redirect(redirect) => {
                    num_redirects += 1;
                    let limit = self.option.limits.max_redirects;
                    if num_redirects > limit {
                        return Err(TnsError::ProtocolExhausted { what: "redirects", limit }.into());
                    }
                    self.follow_redirect(&redirect)?;
                }
                Packet::Refuse(refuse) => {
                    warn!(user_reason = refuse.user_reason, system_reason = refuse.system_reason, message = %refuse.message, "connection refused");
                    return Err(TnsError::Refused {
                        code: refuse.error_code(),
                        system_reason: refuse.system_reason,
                        user_reason: refuse.user_reason,
                        message: refuse.message,
                    }.into());
                }
                other => {
                    return Err(TnsError::HandshakeFailed(format!("unexpected {:?} packet in response to connect", other.packet_type())).into());
                }
            }
        }
    }

    async fn send_connect(&mut self) -> anyhow::Result<()> {
        let connect_data = self.option.connection_data();
        let packet = ConnectPacket::new(&self.context, connect_data.as_bytes())?;
        self.write_packet(packet.to_bytes()).await?;

        if packet.is_data_deferred() {
            debug!(len = connect_data.len(), "connect descriptor does not fit into the connect packet, sending it separately");
            self.put_bytes(connect_data.as_bytes());
            self.write().await?;
            self.out_buffer.clear();
        }
        Ok(())
    }

    fn follow_redirect(&mut self, redirect: &RedirectPacket) -> anyhow::Result<()> {
        let port = redirect.port()?;

        self.option.conn_data = Some(redirect.reconnect_data.clone());
        if let Some(protocol) = redirect.protocol() {
            self.option.protocol = protocol;
        }
        if let Some(host) = redirect.host() {
            self.option.host = host;
        }
        if let Some(port) = port {
            self.option.port = port;
        }
        info!(addr = %redirect.redirect_addr, target = %self.option.dial_addr(), "redirected");
        self.tracer.print(&format!("Redirect to {}", self.option.dial_addr()));
        Ok(())
    }

    /// Closes the connection, if any. Buffers are left as they are.
    pub async fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!("disconnecting");
            connection.shutdown().await;
        }
    }
}
