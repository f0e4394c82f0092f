//! The abstract frame codec consumed by the transport.
//!
//! The transport does not serialize HTTP/2 frames itself; it is handed a
//! codec that splits a negotiated bytestream into a [`FrameReader`] half and
//! a [`FrameWriter`] half, both bit-exact with RFC 7540 (including HPACK and
//! CONTINUATION handling). Tests substitute channel-backed halves.

use std::future::Future;
use std::{fmt, io};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::frame::{Frame, Reason};

/// The client connection preface, sent before any frame.
pub const PREFACE: [u8; 24] = *b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Error surfaced by a [`FrameReader`].
#[derive(Debug)]
pub enum ReadError {
    /// The underlying transport failed.
    Io(io::Error),
    /// The peer sent bytes that do not form a valid frame sequence.
    Protocol {
        /// The error code to convey in the resulting GOAWAY.
        reason: Reason,
        /// Human-readable detail, also sent as GOAWAY debug data.
        message: String,
    },
}

impl ReadError {
    /// A protocol-level read error with the given detail.
    pub fn protocol(reason: Reason, message: impl Into<String>) -> Self {
        Self::Protocol {
            reason,
            message: message.into(),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::Protocol { reason, message } => {
                write!(f, "protocol error ({reason:?}): {message}")
            }
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Protocol { .. } => None,
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(src: io::Error) -> Self {
        Self::Io(src)
    }
}

/// The inbound half of a frame codec.
pub trait FrameReader: Send + 'static {
    /// Read the next frame.
    ///
    /// Resolves to `Ok(None)` when the peer cleanly closed the connection or
    /// the writer half shut the transport down.
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Frame>, ReadError>> + Send;
}

/// The outbound half of a frame codec.
pub trait FrameWriter: Send + 'static {
    /// Serialize one frame into the codec's buffer.
    fn write_frame(&mut self, frame: Frame) -> impl Future<Output = io::Result<()>> + Send;

    /// Flush buffered frames to the wire.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>> + Send;

    /// Tear down the underlying connection.
    ///
    /// After this resolves the reader half observes end-of-stream; this is
    /// how the transport unblocks its reader task during shutdown.
    fn shutdown(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Binds a negotiated bytestream into reader and writer halves.
pub trait FrameCodec<Io>: Send + 'static
where
    Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// The reader half produced by [`bind`](FrameCodec::bind).
    type Reader: FrameReader;
    /// The writer half produced by [`bind`](FrameCodec::bind).
    type Writer: FrameWriter;

    /// Split the bytestream. Called once, after negotiation and after the
    /// connection preface has been written.
    fn bind(self, io: Io) -> (Self::Reader, Self::Writer);
}
