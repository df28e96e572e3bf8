use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use crate::config::{ClientData, ConnectionOption};
use crate::packet::{AcceptPacket, ConnectPacket, DataPacket, TnsPacket, HEADER_LEN};
use crate::session::{Dialer, Session, TnsStream};

pub fn test_option() -> ConnectionOption {
    let mut result = ConnectionOption::new("db.example.com", 1521, "ORCL");
    result.session_data_unit_size = 8192;
    result.transport_data_unit_size = 0xFFFF;
    result.client_data = ClientData {
        program_path: "/usr/bin/app".to_string(),
        program_name: "app".to_string(),
        user_name: "scott".to_string(),
        host_name: "client01".to_string(),
        pid: 4711,
    };
    result
}

/// Hands out one in-memory stream per dial, in the order the endpoints were added
#[derive(Default)]
pub struct ScriptedDialer {
    endpoints: Mutex<VecDeque<DuplexStream>>,
    dialed: Mutex<Vec<(String, String)>>,
}

impl ScriptedDialer {
    pub fn new() -> Arc<ScriptedDialer> {
        Arc::new(ScriptedDialer::default())
    }

    pub fn add_endpoint(&self) -> FakeServer {
        let (client, server) = duplex(1 << 20);
        self.endpoints.lock().unwrap().push_back(client);
        FakeServer { stream: server }
    }

    pub fn dialed(&self) -> Vec<(String, String)> {
        self.dialed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self, protocol: &str, addr: &str) -> anyhow::Result<Box<dyn TnsStream>> {
        self.dialed.lock().unwrap().push((protocol.to_string(), addr.to_string()));
        match self.endpoints.lock().unwrap().pop_front() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(anyhow::anyhow!("no endpoint for {}", addr)),
        }
    }
}

/// The server side of a scripted connection
pub struct FakeServer {
    stream: DuplexStream,
}

impl FakeServer {
    pub async fn read_raw(&mut self) -> Bytes {
        read_raw(&mut self.stream).await
    }

    /// `None` once the client closed the stream
    pub async fn try_read_raw(&mut self) -> Option<Bytes> {
        let mut header = [0u8; HEADER_LEN];
        if self.stream.read_exact(&mut header).await.is_err() {
            return None;
        }
        Some(read_body(&mut self.stream, header).await)
    }

    /// Reads a Connect packet and the descriptor, which may follow in a separate Data packet
    pub async fn read_connect(&mut self) -> (ConnectPacket, String) {
        let connect = ConnectPacket::deser(&self.read_raw().await).unwrap();
        let descriptor = if connect.is_data_deferred() {
            DataPacket::deser(&self.read_raw().await).unwrap().buffer
        }
        else {
            connect.connect_data.clone()
        };
        (connect, String::from_utf8(descriptor.to_vec()).unwrap())
    }

    pub async fn send_raw(&mut self, raw: &[u8]) {
        send_raw(&mut self.stream, raw).await;
    }

    pub async fn send_packet(&mut self, packet: &impl TnsPacket) {
        self.send_raw(&packet.to_bytes()).await;
    }

    pub async fn send_data(&mut self, payload: &[u8]) {
        self.send_packet(&DataPacket::new(0, Bytes::copy_from_slice(payload))).await;
    }

    pub async fn send_resend(&mut self) {
        self.send_raw(&[0, 8, 0, 0, 11, 0, 0, 0]).await;
    }
}

pub async fn read_raw(stream: &mut DuplexStream) -> Bytes {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await.unwrap();
    read_body(stream, header).await
}

async fn read_body(stream: &mut DuplexStream, header: [u8; HEADER_LEN]) -> Bytes {
    let length = usize::from(u16::from_be_bytes([header[0], header[1]]));
    let mut raw = BytesMut::zeroed(length);
    raw[..HEADER_LEN].copy_from_slice(&header);
    stream.read_exact(&mut raw[HEADER_LEN..]).await.unwrap();
    raw.freeze()
}

pub async fn send_raw(stream: &mut DuplexStream, raw: &[u8]) {
    stream.write_all(raw).await.unwrap();
    stream.flush().await.unwrap();
}

/// A session that completed the handshake with a fake server granting `sdu` for both data units
pub async fn connected_session(sdu: u16) -> (Session, FakeServer) {
    let mut option = test_option();
    option.session_data_unit_size = sdu;
    option.transport_data_unit_size = sdu;

    let dialer = ScriptedDialer::new();
    let mut server = dialer.add_endpoint();
    let mut session = Session::new(option).unwrap()
        .with_dialer(dialer);

    let (result, _) = tokio::join!(
        session.connect(),
        async {
            server.read_connect().await;
            server.send_packet(&AcceptPacket::new(312, 0, sdu, sdu)).await;
        },
    );
    result.unwrap();
    (session, server)
}
