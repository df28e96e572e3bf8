use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use anyhow::bail;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time;
use tracing::debug;
use crate::error::TnsError;

/// The duplex byte stream a session runs on: a TCP socket, a TLS stream wrapping one, or an
///  in-memory pipe in tests
pub trait TnsStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl <T: AsyncRead + AsyncWrite + Unpin + Send + 'static> TnsStream for T {}

/// Opens the byte stream for a handshake attempt. `addr` is `host:port`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, protocol: &str, addr: &str) -> anyhow::Result<Box<dyn TnsStream>>;
}

pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, protocol: &str, addr: &str) -> anyhow::Result<Box<dyn TnsStream>> {
        if !protocol.eq_ignore_ascii_case("tcp") {
            bail!("protocol {} is not supported by the plain TCP dialer", protocol);
        }
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr, "TCP connection established");
        Ok(Box::new(stream))
    }
}

/// Aborts a session from outside, typically from a timeout or cancellation watcher running in
///  another task. Pending and future I/O of the session fails with [TnsError::Aborted]; the
///  session must be discarded afterwards.
#[derive(Clone)]
pub struct AbortHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub(crate) fn new() -> AbortHandle {
        AbortHandle {
            signal: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn abort(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.signal.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

/// Runs `io`, giving up when the session is aborted or the timeout expires
pub(crate) async fn guarded<T>(abort: &mut watch::Receiver<bool>, timeout: Option<Duration>, io: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    if *abort.borrow_and_update() {
        return Err(TnsError::Aborted.into());
    }

    let io = async {
        match timeout {
            Some(timeout) => match time::timeout(timeout, io).await {
                Ok(result) => result,
                Err(_) => Err(TnsError::Timeout(timeout).into()),
            },
            None => io.await,
        }
    };

    let aborted = async {
        loop {
            if *abort.borrow_and_update() {
                return;
            }
            if abort.changed().await.is_err() {
                // all handles are gone, nobody can abort any more
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = io => result,
        _ = aborted => Err(TnsError::Aborted.into()),
    }
}

/// The live stream of a connected session
pub(crate) struct Connection {
    stream: Box<dyn TnsStream>,
    abort: watch::Receiver<bool>,
    io_timeout: Option<Duration>,
}

impl Connection {
    pub fn new(stream: Box<dyn TnsStream>, abort: watch::Receiver<bool>, io_timeout: Option<Duration>) -> Connection {
        Connection {
            stream,
            abort,
            io_timeout,
        }
    }

    pub async fn write_all(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let Connection { stream, abort, io_timeout } = self;
        guarded(abort, *io_timeout, async {
            stream.write_all(data).await.map_err(TnsError::Io)?;
            stream.flush().await.map_err(TnsError::Io)?;
            Ok::<_, anyhow::Error>(())
        }).await
    }

    pub async fn read_exact(&mut self, buf: &mut [u8]) -> anyhow::Result<()> {
        let Connection { stream, abort, io_timeout } = self;
        guarded(abort, *io_timeout, async {
            stream.read_exact(buf).await.map_err(TnsError::Io)?;
            Ok::<_, anyhow::Error>(())
        }).await
    }

    /// Best effort, errors are irrelevant because the stream is dropped afterwards
    pub async fn shutdown(mut self) {
        let Connection { stream, abort, io_timeout } = &mut self;
        let _ = guarded(abort, *io_timeout, async {
            stream.shutdown().await.map_err(TnsError::Io)?;
            Ok::<_, anyhow::Error>(())
        }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio::time::sleep;

    fn connection(abort: &AbortHandle, io_timeout: Option<Duration>) -> (Connection, tokio::io::DuplexStream) {
        let (client, server) = duplex(1024);
        (Connection::new(Box::new(client), abort.subscribe(), io_timeout), server)
    }

    #[tokio::test]
    async fn test_read_write() {
        let abort = AbortHandle::new();
        let (mut connection, mut server) = connection(&abort, None);

        connection.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        server.write_all(b"abc").await.unwrap();
        let mut buf = [0u8; 3];
        connection.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_pending_read() {
        let abort = AbortHandle::new();
        let (mut connection, _server) = connection(&abort, None);

        let abort_clone = abort.clone();
        let (result, _) = tokio::join!(
            async {
                let mut buf = [0u8; 1];
                connection.read_exact(&mut buf).await
            },
            async {
                sleep(Duration::from_millis(50)).await;
                abort_clone.abort();
            },
        );
        assert!(matches!(TnsError::of(&result.unwrap_err()), Some(TnsError::Aborted)));
        assert!(abort.is_aborted());

        let err = connection.write_all(b"x").await.unwrap_err();
        assert!(matches!(TnsError::of(&err), Some(TnsError::Aborted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let abort = AbortHandle::new();
        let (mut connection, _server) = connection(&abort, Some(Duration::from_secs(3)));

        let mut buf = [0u8; 1];
        let err = connection.read_exact(&mut buf).await.unwrap_err();
        assert!(matches!(TnsError::of(&err), Some(TnsError::Timeout(t)) if *t == Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let abort = AbortHandle::new();
        let (mut connection, server) = connection(&abort, None);
        drop(server);

        let mut buf = [0u8; 1];
        let err = connection.read_exact(&mut buf).await.unwrap_err();
        assert!(matches!(TnsError::of(&err), Some(TnsError::Io(_))));
    }

    #[tokio::test]
    async fn test_tcp_dialer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let (stream, accepted) = tokio::join!(
            TcpDialer.dial("TCP", &addr),
            listener.accept(),
        );
        let mut stream = stream.unwrap();
        let (mut peer, _) = accepted.unwrap();

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_tcp_dialer_rejects_other_protocols() {
        assert!(TcpDialer.dial("tcps", "127.0.0.1:1").await.is_err());
    }
}
