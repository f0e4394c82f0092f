//! Shared harness: a channel-backed frame codec standing in for a real
//! HTTP/2 peer, plus expect-style helpers over the transport's outbound
//! frames, stream events and listener callbacks.

use std::time::Duration;

use courier_h2::codec::{FrameCodec, FrameReader, FrameWriter, ReadError};
use courier_h2::frame::{
    Data, Frame, GoAway, Headers, Ping, Reset, Settings, WindowUpdate,
};
use courier_h2::{Builder, ClientStream, Plaintext, StreamEvent, Transport, TransportListener};
use courier_rpc::Status;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const IDLE: Duration = Duration::from_millis(100);

// ===== mock codec =====

pub(crate) struct MockCodec {
    reader: MockReader,
    writer: MockWriter,
}

pub(crate) struct MockReader {
    inbound: mpsc::UnboundedReceiver<Frame>,
    closed: watch::Receiver<bool>,
}

pub(crate) struct MockWriter {
    outbound: mpsc::UnboundedSender<Frame>,
    closed: watch::Sender<bool>,
}

impl MockCodec {
    pub(crate) fn new() -> (Self, Peer) {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let codec = Self {
            reader: MockReader {
                inbound,
                closed: closed_rx,
            },
            writer: MockWriter {
                outbound,
                closed: closed_tx,
            },
        };
        let peer = Peer {
            to_client: Some(to_client),
            from_client,
        };
        (codec, peer)
    }
}

impl<Io> FrameCodec<Io> for MockCodec
where
    Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Reader = MockReader;
    type Writer = MockWriter;

    fn bind(self, _io: Io) -> (MockReader, MockWriter) {
        (self.reader, self.writer)
    }
}

impl FrameReader for MockReader {
    async fn next_frame(&mut self) -> Result<Option<Frame>, ReadError> {
        if *self.closed.borrow() {
            return Ok(None);
        }
        tokio::select! {
            frame = self.inbound.recv() => Ok(frame),
            _ = self.closed.changed() => Ok(None),
        }
    }
}

impl FrameWriter for MockWriter {
    async fn write_frame(&mut self, frame: Frame) -> std::io::Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer went away"))
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        let _ = self.closed.send(true);
        Ok(())
    }
}

// ===== the peer half =====

pub(crate) struct Peer {
    to_client: Option<mpsc::UnboundedSender<Frame>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl Peer {
    pub(crate) fn send(&self, frame: impl Into<Frame>) {
        self.to_client
            .as_ref()
            .expect("peer inbound already closed")
            .send(frame.into())
            .expect("transport reader is gone");
    }

    /// Simulate the server closing the connection: the transport's reader
    /// observes end-of-stream.
    pub(crate) fn close_inbound(&mut self) {
        self.to_client = None;
    }

    pub(crate) async fn expect_frame(&mut self) -> Frame {
        timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("transport writer is gone")
    }

    pub(crate) async fn expect_settings(&mut self) -> Settings {
        match self.expect_frame().await {
            Frame::Settings(frame) => frame,
            other => panic!("expected SETTINGS, got {other:?}"),
        }
    }

    pub(crate) async fn expect_headers(&mut self) -> Headers {
        match self.expect_frame().await {
            Frame::Headers(frame) => frame,
            other => panic!("expected HEADERS, got {other:?}"),
        }
    }

    pub(crate) async fn expect_data(&mut self) -> Data {
        match self.expect_frame().await {
            Frame::Data(frame) => frame,
            other => panic!("expected DATA, got {other:?}"),
        }
    }

    pub(crate) async fn expect_ping(&mut self) -> Ping {
        match self.expect_frame().await {
            Frame::Ping(frame) => frame,
            other => panic!("expected PING, got {other:?}"),
        }
    }

    pub(crate) async fn expect_reset(&mut self) -> Reset {
        match self.expect_frame().await {
            Frame::Reset(frame) => frame,
            other => panic!("expected RST_STREAM, got {other:?}"),
        }
    }

    pub(crate) async fn expect_go_away(&mut self) -> GoAway {
        match self.expect_frame().await {
            Frame::GoAway(frame) => frame,
            other => panic!("expected GOAWAY, got {other:?}"),
        }
    }

    pub(crate) async fn expect_window_update(&mut self) -> WindowUpdate {
        match self.expect_frame().await {
            Frame::WindowUpdate(frame) => frame,
            other => panic!("expected WINDOW_UPDATE, got {other:?}"),
        }
    }

    /// Assert the transport emits nothing for a little while.
    pub(crate) async fn assert_idle(&mut self) {
        tokio::time::sleep(IDLE).await;
        match self.from_client.try_recv() {
            Err(mpsc::error::TryRecvError::Empty) => {}
            Ok(frame) => panic!("expected no outbound frames, got {frame:?}"),
            Err(mpsc::error::TryRecvError::Disconnected) => {}
        }
    }
}

// ===== listener recorder =====

#[derive(Debug)]
pub(crate) enum ListenerEvent {
    Ready,
    Shutdown(Status),
    Terminated,
}

pub(crate) struct Recorder {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

pub(crate) struct Events {
    rx: mpsc::UnboundedReceiver<ListenerEvent>,
}

impl Recorder {
    pub(crate) fn new() -> (Self, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, Events { rx })
    }
}

impl TransportListener for Recorder {
    fn transport_ready(&self) {
        let _ = self.tx.send(ListenerEvent::Ready);
    }

    fn transport_shutdown(&self, status: Status) {
        let _ = self.tx.send(ListenerEvent::Shutdown(status));
    }

    fn transport_terminated(&self) {
        let _ = self.tx.send(ListenerEvent::Terminated);
    }
}

impl Events {
    pub(crate) async fn expect(&mut self) -> ListenerEvent {
        timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a listener event")
            .expect("listener recorder dropped")
    }

    pub(crate) async fn expect_ready(&mut self) {
        match self.expect().await {
            ListenerEvent::Ready => {}
            other => panic!("expected transport_ready, got {other:?}"),
        }
    }

    pub(crate) async fn expect_shutdown(&mut self) -> Status {
        match self.expect().await {
            ListenerEvent::Shutdown(status) => status,
            other => panic!("expected transport_shutdown, got {other:?}"),
        }
    }

    pub(crate) async fn expect_terminated(&mut self) {
        match self.expect().await {
            ListenerEvent::Terminated => {}
            other => panic!("expected transport_terminated, got {other:?}"),
        }
    }

    /// Assert no listener callback fires for a little while.
    pub(crate) async fn assert_idle(&mut self) {
        tokio::time::sleep(IDLE).await;
        if let Ok(event) = self.rx.try_recv() {
            panic!("expected no listener events, got {event:?}");
        }
    }
}

// ===== harness =====

pub(crate) struct TestTransport {
    pub(crate) transport: Transport,
    pub(crate) peer: Peer,
    pub(crate) events: Events,
    // Keeps the dial target accepting; the socket itself is unused because
    // the mock codec discards it.
    _listener: TcpListener,
}

pub(crate) async fn connect() -> TestTransport {
    connect_with(|builder| builder).await
}

pub(crate) async fn connect_with(configure: impl FnOnce(Builder) -> Builder) -> TestTransport {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let builder = Transport::builder(addr.to_string(), "test.example.com");
    let transport = configure(builder).build();

    let (codec, peer) = MockCodec::new();
    let (recorder, events) = Recorder::new();
    transport.start(Plaintext, codec, recorder);

    TestTransport {
        transport,
        peer,
        events,
        _listener: listener,
    }
}

/// Drive the connection to READY: consume our initial SETTINGS, answer with
/// the peer's, and consume the resulting ACK.
pub(crate) async fn handshake(t: &mut TestTransport, peer_settings: Settings) {
    let initial = t.peer.expect_settings().await;
    assert!(!initial.is_ack(), "first outbound frame must be SETTINGS");
    t.peer.send(peer_settings);
    t.events.expect_ready().await;
    let ack = t.peer.expect_settings().await;
    assert!(ack.is_ack(), "peer SETTINGS must be acknowledged");
}

pub(crate) fn peer_settings(max_concurrent: Option<u32>, initial_window: Option<u32>) -> Settings {
    let mut settings = Settings::new();
    settings.set_max_concurrent_streams(max_concurrent);
    settings.set_initial_window_size(initial_window);
    settings
}

/// Response trailers carrying a grpc status.
pub(crate) fn trailers(stream_id: u32, code: i32) -> Headers {
    let mut fields = http::HeaderMap::new();
    fields.insert(
        http::header::HeaderName::from_static("grpc-status"),
        http::header::HeaderValue::from_str(&code.to_string()).expect("valid header value"),
    );
    Headers::trailers(stream_id.into(), fields)
}

pub(crate) async fn next_stream_event(stream: &mut ClientStream) -> StreamEvent {
    timeout(WAIT, stream.next_event())
        .await
        .expect("timed out waiting for a stream event")
        .expect("stream event channel ended")
}

pub(crate) async fn expect_closed(stream: &mut ClientStream) -> Status {
    match next_stream_event(stream).await {
        StreamEvent::Closed { status, .. } => status,
        other => panic!("expected Closed, got {other:?}"),
    }
}
