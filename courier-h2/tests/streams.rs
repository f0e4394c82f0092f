//! Stream admission, pending-queue behavior, go-away survival and the
//! stream-id boundary.

mod support;

use courier_h2::frame::{GoAway, PushPromise, Reason, Reset, StreamId};
use courier_rpc::{Code, Metadata, MethodDescriptor, MethodKind, Status};
use support::*;

fn bidi(name: &str) -> MethodDescriptor {
    MethodDescriptor::new(name, MethodKind::BidiStreaming)
}

#[tokio::test]
async fn second_stream_waits_for_capacity() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(Some(1), None)).await;

    let mut first = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    let _second = t.transport.new_stream(bidi("svc.Chat/B"), Metadata::new());

    // Only the first stream reaches the wire.
    assert_eq!(t.peer.expect_headers().await.stream_id(), 3);
    t.peer.assert_idle().await;

    // Freeing the slot starts the queued stream, with the next odd id.
    t.peer.send(Reset::new(3.into(), Reason::CANCEL));
    let status = expect_closed(&mut first).await;
    assert_eq!(status.code(), Code::Cancelled);
    assert_eq!(status.message(), "Cancelled");

    let headers = t.peer.expect_headers().await;
    assert_eq!(headers.stream_id(), 5);
    assert_eq!(headers.pseudo().path(), Some("/svc.Chat/B"));
}

#[tokio::test]
async fn raising_max_concurrent_streams_drains_the_queue() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(Some(1), None)).await;

    let _first = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    let _second = t.transport.new_stream(bidi("svc.Chat/B"), Metadata::new());
    assert_eq!(t.peer.expect_headers().await.stream_id(), 3);
    t.peer.assert_idle().await;

    t.peer.send(peer_settings(Some(2), None));
    assert_eq!(t.peer.expect_headers().await.stream_id(), 5);
    let ack = t.peer.expect_settings().await;
    assert!(ack.is_ack());
}

#[tokio::test]
async fn cancelled_pending_stream_never_starts() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(Some(1), None)).await;

    let _first = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    let mut second = t.transport.new_stream(bidi("svc.Chat/B"), Metadata::new());
    assert_eq!(t.peer.expect_headers().await.stream_id(), 3);

    second.cancel(Status::cancelled("caller gave up"));
    assert_eq!(expect_closed(&mut second).await.code(), Code::Cancelled);

    // No RST_STREAM and no HEADERS: the stream never had an id.
    t.peer.assert_idle().await;
}

#[tokio::test]
async fn graceful_shutdown_lets_active_streams_finish() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    let mut first = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    let mut second = t.transport.new_stream(bidi("svc.Chat/B"), Metadata::new());
    assert_eq!(t.peer.expect_headers().await.stream_id(), 3);
    assert_eq!(t.peer.expect_headers().await.stream_id(), 5);

    t.transport.shutdown();
    let go_away = t.peer.expect_go_away().await;
    assert_eq!(go_away.last_stream_id(), 0);
    assert_eq!(go_away.reason(), Reason::NO_ERROR);
    let status = t.events.expect_shutdown().await;
    assert_eq!(status.code(), Code::Unavailable);

    // Both streams complete normally before the transport terminates.
    t.peer.send(trailers(3, 0));
    assert_eq!(expect_closed(&mut first).await.code(), Code::Ok);
    t.events.assert_idle().await;

    t.peer.send(trailers(5, 0));
    assert_eq!(expect_closed(&mut second).await.code(), Code::Ok);
    t.events.expect_terminated().await;
}

#[tokio::test]
async fn peer_go_away_fails_only_streams_above_the_cutoff() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    let mut s3 = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    let mut s5 = t.transport.new_stream(bidi("svc.Chat/B"), Metadata::new());
    let mut s7 = t.transport.new_stream(bidi("svc.Chat/C"), Metadata::new());
    for expected in [3u32, 5, 7] {
        assert_eq!(t.peer.expect_headers().await.stream_id(), expected);
    }

    t.peer.send(GoAway::new(5.into(), Reason::NO_ERROR));

    // Stream 7 was not processed by the peer; it is safe to retry.
    assert_eq!(expect_closed(&mut s7).await.code(), Code::Unavailable);
    let status = t.events.expect_shutdown().await;
    assert_eq!(status.code(), Code::Internal);

    // No new streams are admitted.
    let mut late = t.transport.new_stream(bidi("svc.Chat/D"), Metadata::new());
    assert_eq!(expect_closed(&mut late).await.code(), Code::Internal);

    // Streams at or below the cutoff run to completion.
    t.peer.send(trailers(3, 0));
    assert_eq!(expect_closed(&mut s3).await.code(), Code::Ok);
    t.peer.send(trailers(5, 0));
    assert_eq!(expect_closed(&mut s5).await.code(), Code::Ok);
    t.events.expect_terminated().await;
}

#[tokio::test]
async fn go_away_debug_data_augments_the_status() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    t.peer.send(GoAway::with_debug_data(
        0.into(),
        Reason::ENHANCE_YOUR_CALM,
        bytes::Bytes::from_static(b"too_many_pings"),
    ));

    let status = t.events.expect_shutdown().await;
    assert_eq!(status.code(), Code::ResourceExhausted);
    assert!(status.message().contains("Enhance your calm"));
    assert!(status.message().contains("too_many_pings"));
    t.events.expect_terminated().await;
}

#[tokio::test]
async fn stream_id_exhaustion_drives_go_away() {
    let mut t = connect_with(|builder| {
        builder.initial_stream_id(StreamId::from(StreamId::MAX.value() - 2))
    })
    .await;
    handshake(&mut t, peer_settings(None, None)).await;

    // The last id in the space still works.
    let mut last = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    let headers = t.peer.expect_headers().await;
    assert_eq!(headers.stream_id(), StreamId::MAX.value() - 2);

    // The next stream finds the space spent and tears the transport down.
    let mut overflow = t.transport.new_stream(bidi("svc.Chat/B"), Metadata::new());
    let status = expect_closed(&mut overflow).await;
    assert_eq!(status.code(), Code::Internal);
    assert_eq!(status.message(), "Stream ids exhausted");

    let shutdown = t.events.expect_shutdown().await;
    assert_eq!(shutdown.code(), Code::Internal);

    // The stream that did start survives the local go-away.
    t.peer.send(trailers(StreamId::MAX.value() - 2, 0));
    assert_eq!(expect_closed(&mut last).await.code(), Code::Ok);
    t.events.expect_terminated().await;
}

#[tokio::test]
async fn push_promise_is_refused() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    let mut stream = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    assert_eq!(t.peer.expect_headers().await.stream_id(), 3);

    t.peer.send(PushPromise::new(3.into(), 2.into(), http::HeaderMap::new()));
    let reset = t.peer.expect_reset().await;
    assert_eq!(reset.stream_id(), 2);
    assert_eq!(reset.reason(), Reason::PROTOCOL_ERROR);

    // The transport survives; the promised stream is simply refused.
    t.peer.send(trailers(3, 0));
    assert_eq!(expect_closed(&mut stream).await.code(), Code::Ok);
}

#[tokio::test]
async fn trailers_status_reaches_the_call() {
    let mut t = connect().await;
    handshake(&mut t, peer_settings(None, None)).await;

    let mut stream = t.transport.new_stream(bidi("svc.Chat/A"), Metadata::new());
    assert_eq!(t.peer.expect_headers().await.stream_id(), 3);

    // NOT_FOUND in trailers.
    t.peer.send(trailers(3, 5));
    assert_eq!(expect_closed(&mut stream).await.code(), Code::NotFound);
}
