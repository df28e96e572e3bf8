use std::time::Duration;
use anyhow::bail;

/// Bytes of each session data unit that are reserved for packet and TTC framing overhead when
///  segmenting outbound messages
pub const SEGMENT_RESERVE: u16 = 20;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientData {
    pub program_path: String,
    pub program_name: String,
    pub user_name: String,
    pub host_name: String,
    pub pid: u32,
}

/// Explicit bounds for loops that the server drives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    /// Number of Redirect packets a single [crate::session::Session::connect] follows before
    ///  giving up
    pub max_redirects: usize,
    /// Number of RESEND requests that are answered while waiting for a single packet
    pub max_resend_replays: usize,
    pub max_saved_states: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        SessionLimits {
            max_redirects: 8,
            max_resend_replays: 3,
            max_saved_states: 64,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConnectionOption {
    /// `tcp` for plain sockets. Other protocols need a [crate::session::Dialer] that supports them.
    pub protocol: String,
    /// May contain a port (`host:port`), in which case `port` is ignored for dialing
    pub host: String,
    pub port: u16,
    pub sid: String,
    pub service_name: String,
    pub instance_name: String,
    pub client_data: ClientData,

    /// Requested session data unit. The server's Accept packet has the final say.
    pub session_data_unit_size: u16,
    pub transport_data_unit_size: u16,

    pub connect_timeout: Option<Duration>,
    /// Applies to every single socket read or write. Expiry is fatal for the session.
    pub io_timeout: Option<Duration>,

    pub limits: SessionLimits,

    /// Opaque reconnect blob received in a Redirect packet. It replaces the generated connect
    ///  descriptor on the next handshake.
    pub conn_data: Option<String>,
}

impl ConnectionOption {
    pub fn new(host: impl Into<String>, port: u16, service_name: impl Into<String>) -> ConnectionOption {
        ConnectionOption {
            protocol: "tcp".to_string(),
            host: host.into(),
            port,
            sid: String::new(),
            service_name: service_name.into(),
            instance_name: String::new(),
            client_data: ClientData::default(),
            session_data_unit_size: 0xFFFF,
            transport_data_unit_size: 0xFFFF,
            connect_timeout: None,
            io_timeout: None,
            limits: SessionLimits::default(),
            conn_data: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            bail!("host must not be empty");
        }
        if self.session_data_unit_size <= SEGMENT_RESERVE {
            bail!("session data unit size must be bigger than {}", SEGMENT_RESERVE);
        }
        if self.transport_data_unit_size == 0 {
            bail!("transport data unit size must not be 0");
        }
        if self.limits.max_saved_states == 0 {
            bail!("max_saved_states must be at least 1");
        }
        Ok(())
    }

    /// The address that is dialed: `host` verbatim if it carries a port, `host:port` otherwise
    pub fn dial_addr(&self) -> String {
        if self.host.contains(':') {
            self.host.clone()
        }
        else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The connect descriptor sent in the Connect packet
    pub fn connection_data(&self) -> String {
        if let Some(conn_data) = &self.conn_data {
            if !conn_data.is_empty() {
                return conn_data.clone();
            }
        }

        let address = format!("(ADDRESS=(PROTOCOL={})(HOST={})(PORT={}))", self.protocol, self.host, self.port);

        let mut connect_data = "(CONNECT_DATA=".to_string();
        if !self.sid.is_empty() {
            connect_data.push_str(&format!("(SID={})", self.sid));
        }
        else {
            connect_data.push_str(&format!("(SERVICE_NAME={})", self.service_name));
        }
        if !self.instance_name.is_empty() {
            connect_data.push_str(&format!("(INSTANCE_NAME={})", self.instance_name));
        }
        connect_data.push_str(&format!("(CID=(PROGRAM={})(HOST={})(USER={}))",
            self.client_data.program_path,
            self.client_data.host_name,
            self.client_data.user_name,
        ));

        format!("(DESCRIPTION={}{}))", address, connect_data)
    }
}
