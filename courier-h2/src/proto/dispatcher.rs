use courier_rpc::{Code, GRPC_MESSAGE_HEADER, GRPC_STATUS_HEADER, Metadata, Status};

use crate::frame::{
    DEFAULT_INITIAL_WINDOW_SIZE, Data, Frame, GoAway, Headers, Ping, PushPromise, Reason, Reset,
    Settings, StreamId, WindowUpdate,
};
use crate::proto::flow_control::Credit;
use crate::proto::transport::{
    Lifecycle, Shared, drain_all_streams_locked, enqueue_data_chunks,
};
use crate::stream::StreamEvent;

/// A connection-fatal condition detected while dispatching an inbound frame.
///
/// The reader loop answers it with GOAWAY carrying `reason` and the message
/// as debug data, then fails the transport.
#[derive(Debug)]
pub(crate) struct ConnectionError {
    pub(crate) reason: Reason,
    pub(crate) message: String,
}

impl ConnectionError {
    fn protocol(message: impl Into<String>) -> Self {
        Self {
            reason: Reason::PROTOCOL_ERROR,
            message: message.into(),
        }
    }

    fn flow_control(message: impl Into<String>) -> Self {
        Self {
            reason: Reason::FLOW_CONTROL_ERROR,
            message: message.into(),
        }
    }
}

impl Shared {
    /// Dispatch one inbound frame. An `Err` tears the connection down.
    pub(crate) fn handle_frame(&self, frame: Frame) -> Result<(), ConnectionError> {
        tracing::trace!(?frame, "received frame");
        match frame {
            Frame::Data(frame) => self.on_data(frame),
            Frame::Headers(frame) => self.on_headers(frame),
            Frame::Settings(frame) => self.on_settings(frame),
            Frame::Ping(frame) => {
                self.on_ping(frame);
                Ok(())
            }
            Frame::Reset(frame) => {
                self.on_reset(frame);
                Ok(())
            }
            Frame::WindowUpdate(frame) => self.on_window_update(frame),
            Frame::GoAway(frame) => {
                self.on_go_away(frame);
                Ok(())
            }
            Frame::PushPromise(frame) => {
                self.on_push_promise(&frame);
                Ok(())
            }
            Frame::Priority(_) => Ok(()),
        }
    }

    fn on_data(&self, frame: Data) -> Result<(), ConnectionError> {
        let id = frame.stream_id();
        if id.is_zero() {
            return Err(ConnectionError::protocol("Received data on stream 0"));
        }
        let len = frame.len();
        let end_stream = frame.is_end_stream();

        let mut finish: Option<(crate::proto::registry::Token, Status, Option<Reason>)> = None;
        {
            let mut guard = self.lock();
            let inner = &mut *guard;

            // Connection-scope receive accounting applies whether or not
            // the stream still exists; the bytes were on the wire either
            // way.
            inner.conn_unacked_recv = inner.conn_unacked_recv.saturating_add(len as u32);
            if inner.conn_unacked_recv >= DEFAULT_INITIAL_WINDOW_SIZE / 2 {
                let increment = std::mem::take(&mut inner.conn_unacked_recv);
                self.queue.enqueue(
                    WindowUpdate::new(StreamId::ZERO, increment).into(),
                    true,
                    None,
                );
            }

            match inner.registry.lookup_id(id) {
                Some(token) => {
                    let Some(state) = inner.registry.get_mut(token) else {
                        return Ok(());
                    };
                    if state.recv.remote_closed {
                        finish = Some((
                            token,
                            Status::internal("Received data after end of stream"),
                            Some(Reason::STREAM_CLOSED),
                        ));
                    } else {
                        state.recv.buffered += len;
                        if state.recv.buffered > self.config.max_message_size {
                            finish = Some((
                                token,
                                Status::resource_exhausted(format!(
                                    "inbound bytes exceeded maximum message size ({})",
                                    self.config.max_message_size
                                )),
                                Some(Reason::CANCEL),
                            ));
                        } else {
                            if len > 0 {
                                state.deliver(StreamEvent::Message(frame.into_payload()));
                            }
                            if end_stream {
                                state.recv.remote_closed = true;
                                // Half-close without trailers is a clean end.
                                finish = Some((token, Status::ok(""), None));
                            }
                        }
                    }
                }
                None => {
                    if inner.registry.may_have_created(id) {
                        tracing::debug!(
                            id = id.value(),
                            "data for a stream this transport no longer tracks; resetting"
                        );
                        self.queue
                            .enqueue(Reset::new(id, Reason::STREAM_CLOSED).into(), true, None);
                    } else {
                        return Err(ConnectionError::protocol(format!(
                            "Received data for unknown stream: {}",
                            id.value()
                        )));
                    }
                }
            }
        }

        if let Some((token, status, reset)) = finish {
            self.finish_stream(token, status, Metadata::new(), reset);
        }
        Ok(())
    }

    fn on_headers(&self, frame: Headers) -> Result<(), ConnectionError> {
        let id = frame.stream_id();
        let end_stream = frame.is_end_stream();

        let mut finish: Option<(crate::proto::registry::Token, Status, Metadata)> = None;
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            match inner.registry.lookup_id(id) {
                Some(token) => {
                    let Some(state) = inner.registry.get_mut(token) else {
                        return Ok(());
                    };
                    let (_pseudo, fields) = frame.into_parts();
                    let metadata = Metadata::from(fields);
                    if end_stream {
                        state.recv.remote_closed = true;
                        let status = status_from_trailers(&metadata);
                        finish = Some((token, status, metadata));
                    } else {
                        state.recv.saw_headers = true;
                        state.deliver(StreamEvent::Headers(metadata));
                    }
                }
                None => {
                    if inner.registry.may_have_created(id) {
                        tracing::debug!(
                            id = id.value(),
                            "headers for a stream this transport no longer tracks; resetting"
                        );
                        self.queue
                            .enqueue(Reset::new(id, Reason::STREAM_CLOSED).into(), true, None);
                    } else {
                        return Err(ConnectionError::protocol(format!(
                            "Received headers for unknown stream: {}",
                            id.value()
                        )));
                    }
                }
            }
        }

        if let Some((token, status, trailers)) = finish {
            self.finish_stream(token, status, trailers, None);
        }
        Ok(())
    }

    fn on_settings(&self, frame: Settings) -> Result<(), ConnectionError> {
        if frame.is_ack() {
            tracing::trace!("our settings acknowledged");
            return Ok(());
        }

        let became_ready = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            if let Some(max) = frame.max_concurrent_streams() {
                tracing::debug!(max, "peer updated max concurrent streams");
                inner.registry.set_max_concurrent_streams(max);
                if inner.registry.has_pending() && inner.registry.has_capacity() {
                    self.queue.drain_pending();
                }
            }

            if let Some(size) = frame.initial_window_size() {
                let delta = inner.flow.set_initial_window(size);
                if delta != 0 {
                    for token in inner.registry.active_tokens() {
                        if let Some(state) = inner.registry.get_mut(token) {
                            state.send.adjust(delta);
                        }
                    }
                }
                if delta > 0 {
                    drain_all_streams_locked(self, inner);
                }
            }

            if let Some(size) = frame.max_frame_size() {
                inner.flow.set_max_frame_size(size);
            }

            let first = !inner.ready_seen;
            inner.ready_seen = true;
            if first && inner.lifecycle == Lifecycle::Connecting {
                inner.lifecycle = Lifecycle::Ready;
            }
            first && !inner.started_go_away
        };

        self.queue.enqueue(Settings::ack().into(), true, None);
        if became_ready {
            tracing::debug!("transport ready");
            self.notify_ready();
        }
        Ok(())
    }

    fn on_ping(&self, frame: Ping) {
        if !frame.is_ack() {
            // Answer immediately with the same payload.
            self.queue
                .enqueue(Ping::pong(frame.payload()).into(), true, None);
            return;
        }
        let completion = { self.lock().ping.on_ack(frame.payload()) };
        match completion {
            Some(completion) => completion.deliver(),
            None => tracing::warn!("received unexpected ping ack"),
        }
    }

    fn on_reset(&self, frame: Reset) {
        let token = { self.lock().registry.lookup_id(frame.stream_id()) };
        let Some(token) = token else {
            tracing::trace!(
                id = frame.stream_id().value(),
                "reset for a stream this transport no longer tracks"
            );
            return;
        };
        let status = frame.reason().rpc_status();
        self.finish_stream(token, status, Metadata::new(), None);
    }

    fn on_window_update(&self, frame: WindowUpdate) -> Result<(), ConnectionError> {
        let id = frame.stream_id();
        let increment = frame.size_increment();

        if id.is_zero() {
            if increment == 0 {
                return Err(ConnectionError::protocol(
                    "Received 0 flow control window increment",
                ));
            }
            let mut guard = self.lock();
            let inner = &mut *guard;
            match inner.flow.credit_connection(increment) {
                Credit::Overflow => Err(ConnectionError::flow_control(
                    "connection flow-control window overflow",
                )),
                Credit::Applied => {
                    drain_all_streams_locked(self, inner);
                    Ok(())
                }
            }
        } else {
            let mut finish: Option<(crate::proto::registry::Token, Status, Option<Reason>)> = None;
            {
                let mut guard = self.lock();
                let inner = &mut *guard;
                match inner.registry.lookup_id(id) {
                    Some(token) => {
                        let Some(state) = inner.registry.get_mut(token) else {
                            return Ok(());
                        };
                        if increment == 0 {
                            finish = Some((
                                token,
                                Status::internal("Received 0 flow control window increment"),
                                Some(Reason::PROTOCOL_ERROR),
                            ));
                        } else {
                            match state.send.credit(increment) {
                                Credit::Overflow => {
                                    finish = Some((
                                        token,
                                        Status::internal("stream flow-control window overflow"),
                                        Some(Reason::FLOW_CONTROL_ERROR),
                                    ));
                                }
                                Credit::Applied => {
                                    let chunks = inner.flow.drain(&mut state.send);
                                    enqueue_data_chunks(&self.queue, id, token, chunks);
                                }
                            }
                        }
                    }
                    None => {
                        if !inner.registry.may_have_created(id) {
                            return Err(ConnectionError::protocol(format!(
                                "Received window_update for unknown stream: {}",
                                id.value()
                            )));
                        }
                        // A stream we once had; late credit is meaningless.
                    }
                }
            }
            if let Some((token, status, reset)) = finish {
                self.finish_stream(token, status, Metadata::new(), reset);
            }
            Ok(())
        }
    }

    fn on_go_away(&self, frame: GoAway) {
        tracing::debug!(?frame, "received GOAWAY");
        let mut status = frame.reason().rpc_status();
        let debug_data = frame.debug_data();
        if !debug_data.is_empty() {
            status = status.augment_message(String::from_utf8_lossy(debug_data));
        }
        // Streams above the peer's cutoff were never processed; they are
        // safe to retry elsewhere, hence UNAVAILABLE rather than the mapped
        // status.
        self.start_go_away(
            frame.last_stream_id(),
            status,
            Some(Status::unavailable(
                "stream not processed by peer before go-away",
            )),
        );
    }

    fn on_push_promise(&self, frame: &PushPromise) {
        tracing::debug!(
            promised_id = frame.promised_id().value(),
            "refusing server push"
        );
        self.queue.enqueue(
            Reset::new(frame.promised_id(), Reason::PROTOCOL_ERROR).into(),
            true,
            None,
        );
    }
}

fn status_from_trailers(trailers: &Metadata) -> Status {
    let Some(value) = trailers.get(GRPC_STATUS_HEADER) else {
        return Status::unknown("missing grpc-status in trailers");
    };
    match value.to_str().ok().and_then(|v| v.parse::<i32>().ok()) {
        Some(code) => {
            let message = trailers
                .get(GRPC_MESSAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned();
            Status::new(Code::from_i32(code), message)
        }
        None => Status::unknown("malformed grpc-status in trailers"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderName, HeaderValue};

    fn trailers(pairs: &[(&'static str, &'static str)]) -> Metadata {
        let mut metadata = Metadata::new();
        for (name, value) in pairs {
            metadata.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        metadata
    }

    #[test]
    fn trailers_with_status_zero_are_ok() {
        let status = status_from_trailers(&trailers(&[("grpc-status", "0")]));
        assert_eq!(status.code(), Code::Ok);
    }

    #[test]
    fn trailers_carry_code_and_message() {
        let status = status_from_trailers(&trailers(&[
            ("grpc-status", "5"),
            ("grpc-message", "no such thing"),
        ]));
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "no such thing");
    }

    #[test]
    fn missing_grpc_status_maps_to_unknown() {
        let status = status_from_trailers(&Metadata::new());
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "missing grpc-status in trailers");
    }

    #[test]
    fn malformed_grpc_status_maps_to_unknown() {
        let status = status_from_trailers(&trailers(&[("grpc-status", "zero")]));
        assert_eq!(status.code(), Code::Unknown);
    }
}
