//! TCP implementation of the length-prefixed frame transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};

use crate::{ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Maximum payload size of a single frame.
///
/// Anything larger is rejected on both send and receive. On the
/// receive side this is the sanity check that turns a garbage length
/// word into an error instead of a multi-gigabyte allocation.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// A TCP listener producing [`FrameConnection`]s.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "frame transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(&self) -> Result<FrameConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let conn = FrameConnection::from_stream(stream, addr);
        tracing::debug!(id = %conn.id(), %addr, "accepted connection");
        Ok(conn)
    }
}

/// One framed byte-stream connection.
///
/// Shareable across tasks: `send` and `force_shutdown` may be called
/// from any task while the owning handler blocks in `recv`. Reader and
/// writer halves are independently locked so a broadcast to this peer
/// never waits on the peer's own pending receive.
pub struct FrameConnection {
    id: ConnectionId,
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    shutdown: Notify,
    shut: AtomicBool,
}

impl FrameConnection {
    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            shutdown: Notify::new(),
            shut: AtomicBool::new(false),
        }
    }

    /// Dials a remote listener.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let peer = stream.peer_addr().map_err(TransportError::ConnectFailed)?;
        Ok(Self::from_stream(stream, peer))
    }

    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one whole frame: 4-byte big-endian length, then payload.
    ///
    /// Length and payload go out in a single buffered write under the
    /// writer lock, so concurrent senders can never interleave partial
    /// frames. If the write itself fails mid-way the connection is
    /// dead and must be dropped.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(payload.len()));
        }

        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    /// Receives the next whole frame.
    ///
    /// Returns `Ok(None)` when the peer closes cleanly (EOF at a frame
    /// boundary). With `idle_timeout` set, returns
    /// [`TransportError::Timeout`] if no complete frame arrives within
    /// the window. A concurrent [`force_shutdown`](Self::force_shutdown)
    /// unblocks a pending call with [`TransportError::Shutdown`].
    ///
    /// Only the connection's owning task should call `recv`; the
    /// timeout clock covers the whole frame, so a peer that stalls
    /// mid-frame counts as idle.
    pub async fn recv(
        &self,
        idle_timeout: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        if self.shut.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }

        let read_frame = self.read_frame();
        tokio::pin!(read_frame);

        match idle_timeout {
            Some(window) => tokio::select! {
                _ = self.shutdown.notified() => Err(TransportError::Shutdown),
                res = tokio::time::timeout(window, &mut read_frame) => match res {
                    Ok(frame) => frame,
                    Err(_) => Err(TransportError::Timeout),
                },
            },
            None => tokio::select! {
                _ = self.shutdown.notified() => Err(TransportError::Shutdown),
                res = &mut read_frame => res,
            },
        }
    }

    async fn read_frame(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut reader = self.reader.lock().await;

        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            // EOF before any length byte is a clean close.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(TransportError::ReceiveFailed(e)),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }

        // EOF from here on means a truncated frame, which is an error.
        let mut payload = vec![0u8; len];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        Ok(Some(payload))
    }

    /// Forces the receive side of this connection shut.
    ///
    /// Callable from any task (admin kickout, server shutdown). A
    /// `recv` blocked on this connection unblocks with
    /// [`TransportError::Shutdown`]; subsequent calls fail the same
    /// way. The underlying socket closes when the connection drops.
    pub fn force_shutdown(&self) {
        self.shut.store(true, Ordering::Release);
        // notify_one stores a permit, so this works even if the owner
        // isn't blocked in recv right now.
        self.shutdown.notify_one();
    }
}
