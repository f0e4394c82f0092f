//! Transport lifecycle scenarios: connect, ready, ping, shutdown,
//! connection loss.

mod support;

use bytes::Bytes;
use courier_h2::frame::{Data, Headers, Ping, Pseudo, Reason};
use courier_rpc::{
    AUTHORITY_OVERRIDE_KEY, Code, Metadata, MethodDescriptor, MethodKind,
};
use http::header::{HeaderName, HeaderValue};
use support::*;

fn unary(name: &str) -> MethodDescriptor {
    MethodDescriptor::new(name, MethodKind::Unary)
}

fn bidi(name: &str) -> MethodDescriptor {
    MethodDescriptor::new(name, MethodKind::BidiStreaming)
}

#[tokio::test]
async fn happy_unary_call() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(Some(100), Some(65_535))).await;

    let mut stream = t
        .transport
        .new_stream(unary("svc.Echo/Ping"), Metadata::new());
    stream.send_message(Bytes::from_static(b"hello"), true);

    let headers = t.peer.expect_headers().await;
    assert_eq!(headers.stream_id(), 3);
    assert!(!headers.is_end_stream());
    assert_eq!(headers.pseudo().path(), Some("/svc.Echo/Ping"));
    assert_eq!(headers.pseudo().authority(), Some("test.example.com"));
    assert_eq!(headers.pseudo().method(), Some(&http::Method::POST));
    assert_eq!(
        headers.fields().get("content-type").map(|v| v.as_bytes()),
        Some(b"application/grpc".as_slice())
    );
    assert_eq!(
        headers.fields().get("te").map(|v| v.as_bytes()),
        Some(b"trailers".as_slice())
    );

    let data = t.peer.expect_data().await;
    assert_eq!(data.stream_id(), 3);
    assert_eq!(data.len(), 5);
    assert!(data.is_end_stream());

    // Respond: headers, then the payload carrying end-of-stream.
    t.peer.send(Headers::new(
        3.into(),
        Pseudo::response(http::StatusCode::OK),
        http::HeaderMap::new(),
    ));
    let mut reply = Data::new(3.into(), Bytes::from_static(b"world"));
    reply.set_end_stream(true);
    t.peer.send(reply);

    assert!(matches!(
        next_stream_event(&mut stream).await,
        courier_h2::StreamEvent::Headers(_)
    ));
    match next_stream_event(&mut stream).await {
        courier_h2::StreamEvent::Message(payload) => assert_eq!(&payload[..], b"world"),
        other => panic!("expected Message, got {other:?}"),
    }
    assert_eq!(expect_closed(&mut stream).await.code(), Code::Ok);

    t.transport.shutdown();
    let go_away = t.peer.expect_go_away().await;
    assert_eq!(go_away.reason(), Reason::NO_ERROR);
    assert_eq!(go_away.last_stream_id(), 0);

    let status = t.events.expect_shutdown().await;
    assert_eq!(status.code(), Code::Unavailable);
    t.events.expect_terminated().await;
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    t.transport.shutdown();
    t.transport.shutdown();

    let go_away = t.peer.expect_go_away().await;
    assert_eq!(go_away.reason(), Reason::NO_ERROR);
    let status = t.events.expect_shutdown().await;
    assert_eq!(status.code(), Code::Unavailable);
    t.events.expect_terminated().await;

    // A second GOAWAY never went out.
    t.peer.assert_idle().await;
    t.transport.shutdown();
    t.events.assert_idle().await;
}

#[tokio::test]
async fn ping_callers_coalesce_on_one_frame() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    let (first, second, ()) = tokio::join!(t.transport.ping(), t.transport.ping(), async {
        let ping = t.peer.expect_ping().await;
        assert!(!ping.is_ack());
        t.peer.send(Ping::pong(ping.payload()));
    });

    let first = first.expect("first ping");
    let second = second.expect("second ping");
    assert_eq!(first, second, "coalesced pings share one sample");

    // Exactly one PING hit the wire.
    t.peer.assert_idle().await;
}

#[tokio::test]
async fn inbound_ping_is_answered_with_the_same_payload() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    t.peer.send(Ping::new(*b"opaque!!"));
    let pong = t.peer.expect_ping().await;
    assert!(pong.is_ack());
    assert_eq!(pong.payload(), *b"opaque!!");
}

#[tokio::test]
async fn ping_after_shutdown_fails() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    t.transport.shutdown();
    let _ = t.peer.expect_go_away().await;
    let _ = t.events.expect_shutdown().await;
    t.events.expect_terminated().await;

    let err = t.transport.ping().await.expect_err("ping after stop");
    assert_eq!(err.code(), Code::Unavailable);
}

#[tokio::test]
async fn reader_end_of_stream_fails_active_streams() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    let mut stream = t.transport.new_stream(bidi("svc.Chat/Open"), Metadata::new());
    assert_eq!(t.peer.expect_headers().await.stream_id(), 3);

    t.peer.close_inbound();

    let status = t.events.expect_shutdown().await;
    assert_eq!(status.code(), Code::Unavailable);
    assert_eq!(expect_closed(&mut stream).await.code(), Code::Unavailable);
    t.events.expect_terminated().await;
}

#[tokio::test]
async fn connect_failure_reports_shutdown_then_terminated() {
    use courier_h2::{Plaintext, Transport};
    use tokio::net::TcpListener;

    // Grab a port, then free it so the dial is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let transport = Transport::builder(addr.to_string(), "gone.example.com").build();
    let (codec, _peer) = MockCodec::new();
    let (recorder, mut events) = Recorder::new();
    transport.start(Plaintext, codec, recorder);

    let mut stream = transport.new_stream(unary("svc.Echo/Ping"), Metadata::new());

    let status = events.expect_shutdown().await;
    assert_eq!(status.code(), Code::Unavailable);
    events.expect_terminated().await;
    assert_eq!(expect_closed(&mut stream).await.code(), Code::Unavailable);
}

#[tokio::test]
async fn authority_override_moves_to_the_pseudo_header() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    let mut metadata = Metadata::new();
    metadata.insert(
        HeaderName::from_static(AUTHORITY_OVERRIDE_KEY),
        HeaderValue::from_static("override.example.com"),
    );
    metadata.insert(
        HeaderName::from_static("x-tenant"),
        HeaderValue::from_static("blue"),
    );
    let _stream = t.transport.new_stream(bidi("svc.Chat/Open"), metadata);

    let headers = t.peer.expect_headers().await;
    assert_eq!(headers.pseudo().authority(), Some("override.example.com"));
    assert!(headers.fields().get(AUTHORITY_OVERRIDE_KEY).is_none());
    assert_eq!(
        headers.fields().get("x-tenant").map(|v| v.as_bytes()),
        Some(b"blue".as_slice())
    );
}
