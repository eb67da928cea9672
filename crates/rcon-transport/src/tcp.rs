//! TCP transport implementation using `tokio::net`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Connector, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Size of the read buffer handed to the socket on each `recv`.
const READ_CHUNK: usize = 8192;

/// A [`Connector`] that dials a fixed `host:port` over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector for `host:port` that gives up after `timeout`.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout,
        }
    }

    /// The `host:port` this connector dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn connect(&self) -> Result<TcpConnection, TransportError> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout(self.addr.clone()))?
            .map_err(|source| TransportError::ConnectFailed {
                addr: self.addr.clone(),
                source,
            })?;

        TcpConnection::from_stream(stream)
    }
}

/// A single TCP connection to the game server.
///
/// The stream is split so that a pending `recv` never blocks a `send`.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpConnection {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        // Commands are small and latency matters more than throughput.
        stream.set_nodelay(true).map_err(TransportError::SendFailed)?;
        let peer = stream.peer_addr().map_err(TransportError::ReceiveFailed)?;
        let (reader, writer) = stream.into_split();

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "opened TCP connection");

        Ok(Self {
            id,
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        })
    }

    /// The remote address of this connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Bytes>, Self::Error> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        // `read_buf` is cancel safe, so this can sit in a `select!`.
        let n = self
            .reader
            .lock()
            .await
            .read_buf(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        tracing::debug!(id = %self.id, peer = %self.peer, "closing TCP connection");
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
