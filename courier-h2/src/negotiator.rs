//! Bringing a raw TCP socket to an HTTP/2-ready bytestream.
//!
//! The transport dials TCP itself, then hands the socket to a [`Negotiate`]
//! implementation: plaintext pass-through, a TLS handshake, or an HTTP/1.1
//! Upgrade. Whatever comes back is where the connection preface and the
//! first SETTINGS frame go.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use courier_rpc::Status;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

/// Largest HTTP/1.1 response head accepted during an Upgrade.
const MAX_UPGRADE_HEAD: usize = 16 * 1024;

/// Transforms an established TCP socket into the bytestream the frame codec
/// will run over.
///
/// Negotiation failure is the transport's terminal status; nothing is
/// retried.
pub trait Negotiate: Send + 'static {
    /// The negotiated bytestream.
    type Io: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Perform the negotiation. `authority` is the transport's default
    /// authority and supplies the TLS verification name or the HTTP/1.1
    /// `Host`.
    fn negotiate(
        self,
        tcp: TcpStream,
        authority: &str,
    ) -> impl Future<Output = Result<Self::Io, Status>> + Send;
}

/// Direct plaintext HTTP/2: the socket is already the bytestream.
#[derive(Debug, Default, Clone, Copy)]
pub struct Plaintext;

impl Negotiate for Plaintext {
    type Io = TcpStream;

    async fn negotiate(self, tcp: TcpStream, _authority: &str) -> Result<TcpStream, Status> {
        Ok(tcp)
    }
}

/// TLS with ALPN/ciphers per the caller's `rustls` client configuration.
///
/// The SNI and verification name come from strict parsing of the authority;
/// a malformed authority fails the transport rather than falling back to
/// the raw string.
#[cfg(feature = "tls")]
#[derive(Clone)]
pub struct Tls {
    config: std::sync::Arc<tokio_rustls::rustls::ClientConfig>,
}

#[cfg(feature = "tls")]
impl Tls {
    pub fn new(config: std::sync::Arc<tokio_rustls::rustls::ClientConfig>) -> Self {
        Self { config }
    }
}

#[cfg(feature = "tls")]
impl Negotiate for Tls {
    type Io = tokio_rustls::client::TlsStream<TcpStream>;

    async fn negotiate(self, tcp: TcpStream, authority: &str) -> Result<Self::Io, Status> {
        let parsed: http::uri::Authority = authority.parse().map_err(|e| {
            Status::invalid_argument(format!("invalid authority: {authority}")).with_source(e)
        })?;
        let server_name = rustls_pki_types::ServerName::try_from(parsed.host().to_owned())
            .map_err(|e| {
                Status::invalid_argument("authority host is not a valid TLS server name")
                    .with_source(e)
            })?;
        let connector = tokio_rustls::TlsConnector::from(self.config);
        connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Status::unavailable("TLS handshake failed").with_source(e))
    }
}

/// HTTP/1.1 `Upgrade: h2c`.
///
/// Sends the upgrade request, validates the `101 Switching Protocols`
/// response, and replays any bytes the server sent after the response head
/// (its SETTINGS often share the packet) ahead of the socket.
#[derive(Debug, Default, Clone)]
pub struct PlaintextUpgrade {
    settings_payload: Bytes,
}

impl PlaintextUpgrade {
    /// Upgrade advertising protocol-default settings in `HTTP2-Settings`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upgrade with a caller-serialized SETTINGS payload for the
    /// `HTTP2-Settings` header. Serialization belongs to whoever owns the
    /// frame codec.
    #[must_use]
    pub fn with_settings_payload(settings_payload: Bytes) -> Self {
        Self { settings_payload }
    }
}

impl Negotiate for PlaintextUpgrade {
    type Io = Rewind<TcpStream>;

    async fn negotiate(self, mut tcp: TcpStream, authority: &str) -> Result<Self::Io, Status> {
        let token = URL_SAFE_NO_PAD.encode(&self.settings_payload);
        let request = format!(
            "GET / HTTP/1.1\r\n\
             Host: {authority}\r\n\
             Connection: Upgrade, HTTP2-Settings\r\n\
             Upgrade: h2c\r\n\
             HTTP2-Settings: {token}\r\n\
             \r\n"
        );
        tcp.write_all(request.as_bytes()).await.map_err(|e| {
            Status::unavailable("failed to write HTTP/1.1 upgrade request").with_source(e)
        })?;

        let mut head = Vec::with_capacity(1024);
        let mut chunk = [0u8; 512];
        loop {
            let n = tcp.read(&mut chunk).await.map_err(|e| {
                Status::unavailable("failed to read HTTP/1.1 upgrade response").with_source(e)
            })?;
            if n == 0 {
                return Err(Status::unavailable(
                    "connection closed during HTTP/1.1 upgrade",
                ));
            }
            head.extend_from_slice(&chunk[..n]);
            if let Some(end) = find_head_end(&head) {
                if !head.starts_with(b"HTTP/1.1 101") {
                    let line_end = head
                        .iter()
                        .position(|b| *b == b'\r')
                        .unwrap_or(head.len().min(64));
                    return Err(Status::unavailable(format!(
                        "server refused h2c upgrade: {}",
                        String::from_utf8_lossy(&head[..line_end])
                    )));
                }
                let leftover = Bytes::copy_from_slice(&head[end..]);
                return Ok(Rewind::new(leftover, tcp));
            }
            if head.len() > MAX_UPGRADE_HEAD {
                return Err(Status::unavailable("oversized HTTP/1.1 upgrade response"));
            }
        }
    }
}

/// Position just past the `\r\n\r\n` terminating a response head.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// An I/O stream with a prefix of already-read bytes replayed first.
#[derive(Debug)]
pub struct Rewind<T> {
    prefix: Bytes,
    inner: T,
}

impl<T> Rewind<T> {
    pub(crate) fn new(prefix: Bytes, inner: T) -> Self {
        Self { prefix, inner }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Rewind<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Rewind<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
