//! The per-call stream handle and its transport-side state.

use bytes::Bytes;
use courier_rpc::{Metadata, Status};
use http::header::HeaderMap;
use tokio::sync::mpsc;

use crate::frame::{Pseudo, StreamId};
use crate::proto::flow_control::SendState;
use crate::proto::registry::Token;
use crate::proto::transport::Shared;
use std::sync::Arc;

/// An event delivered to the call that owns a [`ClientStream`].
#[derive(Debug)]
pub enum StreamEvent {
    /// Response headers arrived.
    Headers(Metadata),
    /// Response message bytes arrived. Framing into messages is the RPC
    /// codec's concern; the transport delivers payload bytes as received.
    Message(Bytes),
    /// The call reached its terminal status. Delivered exactly once, last.
    Closed {
        status: Status,
        trailers: Metadata,
    },
}

/// One RPC call multiplexed over the transport.
///
/// Returned by [`Transport::new_stream`]; sending is possible immediately,
/// even while the stream waits for the connection or for concurrency
/// capacity. If the stream is rejected it reports the rejection through a
/// final [`StreamEvent::Closed`].
///
/// [`Transport::new_stream`]: crate::Transport::new_stream
#[derive(Debug)]
pub struct ClientStream {
    shared: Arc<Shared>,
    token: Token,
    events: mpsc::UnboundedReceiver<StreamEvent>,
}

impl ClientStream {
    pub(crate) fn new(
        shared: Arc<Shared>,
        token: Token,
        events: mpsc::UnboundedReceiver<StreamEvent>,
    ) -> Self {
        Self {
            shared,
            token,
            events,
        }
    }

    /// Receive the next event for this call.
    ///
    /// Returns `None` after [`StreamEvent::Closed`] has been consumed.
    /// Draining message bytes here is what acknowledges them to the peer's
    /// flow controller, so a call that stops reading eventually stalls the
    /// peer instead of buffering without bound.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.events.recv().await?;
        if let StreamEvent::Message(payload) = &event {
            self.shared.record_consumed(self.token, payload.len());
        }
        Some(event)
    }

    /// Submit outbound message bytes; `end_stream` half-closes the local
    /// side after these bytes.
    ///
    /// Bytes beyond the current flow-control credit queue inside the
    /// transport and drain as the peer grants window.
    pub fn send_message(&self, payload: Bytes, end_stream: bool) {
        self.shared.send_message(self.token, payload, end_stream);
    }

    /// Cancel the call: the peer sees RST_STREAM(CANCEL) and the call
    /// reports `status`.
    pub fn cancel(&self, status: Status) {
        self.shared.cancel_stream(self.token, status);
    }
}

/// Inbound-side accounting for one stream.
#[derive(Debug, Default)]
pub(crate) struct RecvState {
    /// Bytes delivered to the call but not yet acknowledged with a
    /// stream-level WINDOW_UPDATE.
    pub(crate) unacked: u32,
    /// Bytes delivered but not yet drained by the call.
    pub(crate) buffered: usize,
    /// Whether the peer half-closed.
    pub(crate) remote_closed: bool,
    /// Whether response headers were seen (distinguishes trailers).
    pub(crate) saw_headers: bool,
}

/// Transport-side state of one stream. Guarded by the transport mutex.
#[derive(Debug)]
pub(crate) struct StreamState {
    id: Option<StreamId>,
    /// The request head, held until admission control starts the stream.
    request: Option<(Pseudo, HeaderMap)>,
    /// Whether HEADERS should be flushed eagerly. Calls where the client
    /// sends exactly one message leave this false so HEADERS ride the same
    /// flush as the DATA that follows.
    flush_headers: bool,
    events: mpsc::UnboundedSender<StreamEvent>,
    pub(crate) send: SendState,
    pub(crate) recv: RecvState,
}

impl StreamState {
    pub(crate) fn new(
        request: Option<(Pseudo, HeaderMap)>,
        flush_headers: bool,
        events: mpsc::UnboundedSender<StreamEvent>,
        initial_window: u32,
    ) -> Self {
        Self {
            id: None,
            request,
            flush_headers,
            events,
            send: SendState::new(initial_window),
            recv: RecvState::default(),
        }
    }

    pub(crate) fn id(&self) -> Option<StreamId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: StreamId) {
        debug_assert!(self.id.is_none(), "stream id assigned twice");
        self.id = Some(id);
    }

    pub(crate) fn take_request(&mut self) -> Option<(Pseudo, HeaderMap)> {
        self.request.take()
    }

    pub(crate) fn flush_headers(&self) -> bool {
        self.flush_headers
    }

    /// Deliver a non-terminal event. The call may have dropped its handle;
    /// that only means nobody is listening.
    pub(crate) fn deliver(&self, event: StreamEvent) {
        let _ = self.events.send(event);
    }

    /// Report the terminal status. Consumes the state, which has already
    /// been removed from the registry, so the status is reported exactly
    /// once.
    pub(crate) fn close(self, status: Status, trailers: Metadata) {
        let _ = self.events.send(StreamEvent::Closed { status, trailers });
    }
}
