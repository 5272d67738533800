/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Dialing a remote listener failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// Sending a frame failed. The connection is unusable afterwards —
    /// a partial frame may be on the wire, so reconnect is the only
    /// recovery.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a frame failed, including a peer that closed mid-frame.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A frame's declared payload length exceeds [`MAX_FRAME_LEN`].
    ///
    /// On receive this usually means the peer isn't speaking the
    /// protocol at all and we read garbage as a length word.
    ///
    /// [`MAX_FRAME_LEN`]: crate::MAX_FRAME_LEN
    #[error("frame of {0} bytes exceeds maximum")]
    FrameTooLarge(usize),

    /// No frame arrived within the caller's inactivity window.
    ///
    /// Distinguished from [`ReceiveFailed`](Self::ReceiveFailed) so
    /// the session layer can label the disconnect as inactivity rather
    /// than a hard I/O fault.
    #[error("receive timed out")]
    Timeout,

    /// The connection was shut down locally via
    /// [`force_shutdown`](crate::FrameConnection::force_shutdown).
    #[error("connection force-shut locally")]
    Shutdown,
}
