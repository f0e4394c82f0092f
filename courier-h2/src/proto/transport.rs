use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use courier_rpc::{
    GRPC_CONTENT_TYPE, Metadata, MethodDescriptor, Status, TE_TRAILERS,
};
use http::Method;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use parking_lot::{Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::client::TransportListener;
use crate::codec::{FrameCodec, FrameReader, FrameWriter, PREFACE, ReadError};
use crate::frame::{
    Data, Frame, GoAway, Headers, Ping, Pseudo, Reason, Reset, Settings, StreamId,
};
use crate::negotiator::Negotiate;
use crate::proto::flow_control::FlowController;
use crate::proto::ping::PingTracker;
use crate::proto::registry::{Registry, Token};
use crate::proto::write_queue::{Command, WriteQueue};
use crate::stream::{ClientStream, StreamState};

/// Streams the transport lets start before the peer's first SETTINGS
/// advertises a real limit. The conservative value the HTTP/2 spec suggests
/// endpoints at least allow.
const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = 100;

/// Transport configuration, fixed at build time.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) addr: String,
    pub(crate) authority: String,
    pub(crate) scheme: String,
    /// Our advertised per-stream receive window.
    pub(crate) initial_window_size: u32,
    /// Bound on a stream's delivered-but-undrained inbound bytes.
    pub(crate) max_message_size: usize,
    pub(crate) max_header_list_size: u32,
    pub(crate) initial_stream_id: StreamId,
}

/// The transport lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    New,
    Connecting,
    Ready,
    GoingAway,
    Terminated,
}

/// State guarded by the transport-wide mutex.
///
/// Lock discipline: the lock is never held across an `.await`; listener
/// callbacks never run under it; enqueuing onto the write queue under it is
/// fine because the queue never blocks.
pub(crate) struct Inner {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) registry: Registry,
    pub(crate) flow: FlowController,
    pub(crate) ping: PingTracker,
    /// Inbound connection-scope bytes not yet returned via WINDOW_UPDATE(0).
    pub(crate) conn_unacked_recv: u32,
    /// The go-away transition has begun: shutdown is being (or has been)
    /// delivered and no new stream id will ever be assigned.
    pub(crate) started_go_away: bool,
    /// The observable post-transition state; set strictly after the
    /// listener saw `transport_shutdown`.
    pub(crate) go_away: bool,
    pub(crate) go_away_status: Option<Status>,
    /// A local `shutdown()` call has been accepted.
    pub(crate) local_shutdown: bool,
    /// The listener has seen `transport_shutdown`.
    pub(crate) shutdown_delivered: bool,
    /// All streams are gone and the writer has been told to close.
    pub(crate) stopped: bool,
    /// The peer's first SETTINGS frame was seen.
    pub(crate) ready_seen: bool,
}

/// Everything the transport's tasks and handles share.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) queue: WriteQueue,
    listener: OnceLock<Box<dyn TransportListener>>,
    pub(crate) state: Mutex<Inner>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("authority", &self.config.authority)
            .finish_non_exhaustive()
    }
}

/// Deferred work computed under the lock and performed after releasing it.
#[derive(Default)]
#[must_use]
pub(crate) struct StopActions {
    ping_waiters: Vec<oneshot::Sender<Result<Duration, Status>>>,
    ping_status: Option<Status>,
}

impl StopActions {
    pub(crate) fn perform(self) {
        if let Some(status) = self.ping_status {
            for waiter in self.ping_waiters {
                let _ = waiter.send(Err(status.clone()));
            }
        }
    }
}

impl Shared {
    pub(crate) fn new(config: Config, queue: WriteQueue) -> Self {
        let registry = Registry::new(config.initial_stream_id, DEFAULT_MAX_CONCURRENT_STREAMS);
        Self {
            config,
            queue,
            listener: OnceLock::new(),
            state: Mutex::new(Inner {
                lifecycle: Lifecycle::New,
                registry,
                flow: FlowController::new(),
                ping: PingTracker::default(),
                conn_unacked_recv: 0,
                started_go_away: false,
                go_away: false,
                go_away_status: None,
                local_shutdown: false,
                shutdown_delivered: false,
                stopped: false,
                ready_seen: false,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock()
    }

    pub(crate) fn install_listener(&self, listener: Box<dyn TransportListener>) {
        let _ = self.listener.set(listener);
    }

    pub(crate) fn notify_ready(&self) {
        if let Some(listener) = self.listener.get() {
            listener.transport_ready();
        }
    }

    /// Deliver `transport_shutdown` exactly once across the transport's
    /// lifetime. A no-op until a listener is installed, so a shutdown that
    /// races ahead of `start` is re-delivered by `start` itself.
    pub(crate) fn notify_shutdown_once(&self, status: Status) {
        let deliver = {
            let mut inner = self.lock();
            if inner.shutdown_delivered || self.listener.get().is_none() {
                false
            } else {
                inner.shutdown_delivered = true;
                true
            }
        };
        if deliver {
            self.notify_shutdown(status);
        }
    }

    fn notify_shutdown(&self, status: Status) {
        if let Some(listener) = self.listener.get() {
            listener.transport_shutdown(status);
        }
    }

    fn notify_terminated(&self) {
        if let Some(listener) = self.listener.get() {
            listener.transport_terminated();
        }
    }

    // ===== lifecycle =====

    /// Begin the go-away transition, or extend it with a tighter sweep.
    ///
    /// The first caller delivers `transport_shutdown` (off-lock) before the
    /// observable `go_away` flag is set, so a concurrent terminator cannot
    /// report termination ahead of shutdown. Every caller sweeps started
    /// streams above `last_known` and clears the pending queue; swept
    /// streams report `swept` when given, else `status`.
    pub(crate) fn start_go_away(
        &self,
        last_known: StreamId,
        status: Status,
        swept: Option<Status>,
    ) {
        let deliver = {
            let mut inner = self.lock();
            if inner.started_go_away {
                false
            } else {
                inner.started_go_away = true;
                inner.go_away_status = Some(status.clone());
                if inner.lifecycle != Lifecycle::Terminated {
                    inner.lifecycle = Lifecycle::GoingAway;
                }
                true
            }
        };
        if deliver {
            tracing::debug!(%status, last_known = last_known.value(), "transport shutting down");
            self.notify_shutdown_once(status.clone());
        }

        let swept_status = swept.unwrap_or(status);
        let (closed, stop) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            inner.go_away = true;
            let mut closed = inner.registry.sweep_above(last_known);
            closed.extend(inner.registry.take_pending());
            let stop = self.stop_if_necessary_locked(inner);
            (closed, stop)
        };
        for state in closed {
            state.close(swept_status.clone(), Metadata::new());
        }
        stop.perform();
    }

    /// A transport-fatal failure: everything still running fails with
    /// `status`.
    pub(crate) fn on_exception(&self, status: Status) {
        self.start_go_away(StreamId::ZERO, status, None);
    }

    /// Once the transport is going away and no stream remains, close the
    /// writer (which tears down the connection and thereby unblocks the
    /// reader) and fail the outstanding ping.
    pub(crate) fn stop_if_necessary_locked(&self, inner: &mut Inner) -> StopActions {
        if inner.started_go_away && inner.registry.is_idle() && !inner.stopped {
            inner.stopped = true;
            tracing::debug!("all streams drained; closing connection");
            let ping_waiters = inner.ping.fail();
            let ping_status = Some(
                inner
                    .go_away_status
                    .clone()
                    .unwrap_or_else(|| Status::unavailable("Connection closed")),
            );
            self.queue.shutdown();
            StopActions {
                ping_waiters,
                ping_status,
            }
        } else {
            StopActions::default()
        }
    }

    pub(crate) fn shutdown(&self) {
        {
            let mut inner = self.lock();
            if inner.started_go_away || inner.local_shutdown {
                return;
            }
            inner.local_shutdown = true;
        }
        // GOAWAY with last-stream-id 0 tells the peer we created nothing it
        // needs to finish; our own streams run to completion, which the MAX
        // sentinel below expresses.
        self.queue
            .enqueue(GoAway::new(StreamId::ZERO, Reason::NO_ERROR).into(), true, None);
        self.start_go_away(
            StreamId::MAX,
            Status::unavailable("Transport stopped"),
            None,
        );
    }

    // ===== stream operations =====

    pub(crate) fn new_stream(
        self: &Arc<Self>,
        method: MethodDescriptor,
        mut metadata: Metadata,
    ) -> ClientStream {
        let authority = metadata
            .take_authority_override()
            .unwrap_or_else(|| self.config.authority.clone());
        let pseudo = Pseudo::request(
            Method::POST,
            self.config.scheme.clone(),
            authority,
            method.path(),
        );
        let mut fields = HeaderMap::new();
        fields.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(GRPC_CONTENT_TYPE),
        );
        fields.insert(header::TE, HeaderValue::from_static(TE_TRAILERS));
        fields.insert(
            header::USER_AGENT,
            HeaderValue::from_static(concat!("courier-h2/", env!("CARGO_PKG_VERSION"))),
        );
        let mut last_name: Option<HeaderName> = None;
        for (name, value) in metadata.into_headers() {
            if let Some(name) = name {
                last_name = Some(name);
            }
            if let Some(name) = &last_name {
                fields.append(name.clone(), value);
            }
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let flush_headers = !method.kind().client_sends_one_message();
        let (token, rejected) = {
            let mut inner = self.lock();
            let rejected = inner.go_away;
            let initial_window = inner.flow.initial_window();
            let token = inner.registry.insert(StreamState::new(
                Some((pseudo, fields)),
                flush_headers,
                events_tx,
                initial_window,
            ));
            (token, rejected)
        };

        if rejected {
            // Past go-away no stream ever starts; report the terminal
            // status without touching the wire.
            self.reject_stream(token);
        } else if !self.queue.create_stream(token) {
            self.reject_stream(token);
        }
        // Otherwise admission runs on the writer task so it observes
        // connection readiness and participates in wire-level ordering.
        ClientStream::new(self.clone(), token, events_rx)
    }

    /// Fail a stream that can no longer start, reporting the go-away status.
    pub(crate) fn reject_stream(&self, token: Token) {
        let (state, status) = {
            let mut inner = self.lock();
            let Some(state) = inner.registry.remove(token) else {
                return;
            };
            let status = inner
                .go_away_status
                .clone()
                .unwrap_or_else(|| Status::unavailable("Transport stopped"));
            (state, status)
        };
        state.close(status, Metadata::new());
    }

    pub(crate) fn send_message(&self, token: Token, payload: Bytes, end_stream: bool) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(state) = inner.registry.get_mut(token) else {
            // Already finished; late writes are silently dropped.
            return;
        };
        if state.send.is_local_closed() {
            tracing::warn!("message submitted after local half-close; dropping");
            return;
        }
        if end_stream {
            state.send.close_local();
        }
        state.send.push(payload, end_stream);
        if let Some(id) = state.id() {
            let chunks = inner.flow.drain(&mut state.send);
            enqueue_data_chunks(&self.queue, id, token, chunks);
        }
        // A stream still waiting for admission keeps its data queued; it
        // drains right after HEADERS when the stream starts.
    }

    pub(crate) fn cancel_stream(&self, token: Token, status: Status) {
        let (state, stop) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(state) = inner.registry.remove(token) else {
                return;
            };
            if let Some(id) = state.id() {
                self.queue
                    .enqueue(Reset::new(id, Reason::CANCEL).into(), true, None);
            }
            let stop = self.after_removal_locked(inner);
            (state, stop)
        };
        state.close(status, Metadata::new());
        stop.perform();
    }

    /// Finish a started stream: remove it, optionally reset it on the wire,
    /// and report its terminal status.
    pub(crate) fn finish_stream(
        &self,
        token: Token,
        status: Status,
        trailers: Metadata,
        reset: Option<Reason>,
    ) {
        let (state, stop) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(state) = inner.registry.remove(token) else {
                return;
            };
            if let (Some(reason), Some(id)) = (reset, state.id()) {
                self.queue.enqueue(Reset::new(id, reason).into(), true, None);
            }
            let stop = self.after_removal_locked(inner);
            (state, stop)
        };
        state.close(status, trailers);
        stop.perform();
    }

    /// After a stream leaves the registry: start pending streams if capacity
    /// was freed, otherwise see whether the transport can stop.
    pub(crate) fn after_removal_locked(&self, inner: &mut Inner) -> StopActions {
        if inner.registry.has_pending() && inner.registry.has_capacity() {
            self.queue.drain_pending();
            StopActions::default()
        } else {
            self.stop_if_necessary_locked(inner)
        }
    }

    /// The call drained `n` message bytes; acknowledge them to the peer once
    /// half a window accumulates.
    pub(crate) fn record_consumed(&self, token: Token, n: usize) {
        let mut inner = self.lock();
        let Some(state) = inner.registry.get_mut(token) else {
            return;
        };
        let Some(id) = state.id() else {
            return;
        };
        state.recv.buffered = state.recv.buffered.saturating_sub(n);
        state.recv.unacked = state.recv.unacked.saturating_add(n as u32);
        if state.recv.unacked >= self.config.initial_window_size / 2 {
            let increment = std::mem::take(&mut state.recv.unacked);
            self.queue.enqueue(
                crate::frame::WindowUpdate::new(id, increment).into(),
                true,
                None,
            );
        }
    }

    // ===== ping =====

    pub(crate) async fn ping(&self) -> Result<Duration, Status> {
        let (waiter_tx, waiter_rx) = oneshot::channel();
        let to_send = {
            let mut inner = self.lock();
            if inner.lifecycle == Lifecycle::New {
                return Err(Status::unavailable("transport not started"));
            }
            if inner.started_go_away || inner.stopped {
                return Err(inner
                    .go_away_status
                    .clone()
                    .unwrap_or_else(|| Status::unavailable("Connection closed")));
            }
            inner
                .ping
                .register(|| rand::random::<u64>().to_be_bytes(), waiter_tx)
        };

        // The caller that opened this round trip also watches the PING
        // frame onto the wire; a failed or abandoned write fails the ping
        // without waiting for the transport to finish tearing down.
        if let Some(payload) = to_send {
            match self
                .queue
                .enqueue_tracked(Ping::new(payload).into(), true, None)
            {
                Some(handle) => {
                    if handle.finished().await.is_err() {
                        self.fail_outstanding_ping();
                    }
                }
                None => self.fail_outstanding_ping(),
            }
        }

        waiter_rx
            .await
            .map_err(|_| Status::unavailable("Connection closed"))?
    }

    /// Fail the outstanding ping (and everyone coalesced onto it) with the
    /// transport's terminal status. Idempotent: the waiters are handed out
    /// once.
    fn fail_outstanding_ping(&self) {
        let (waiters, status) = {
            let mut inner = self.lock();
            let status = inner
                .go_away_status
                .clone()
                .unwrap_or_else(|| Status::unavailable("Connection closed"));
            (inner.ping.fail(), status)
        };
        for waiter in waiters {
            let _ = waiter.send(Err(status.clone()));
        }
    }

    // ===== writer-task admission =====

    /// Process a CreateStream command: reject after go-away, queue at the
    /// concurrency cap, otherwise assign the next id and produce the frames
    /// to write. Reaching the end of the id space first drives the
    /// transport into go-away, then rejects the stream.
    pub(crate) fn prepare_create_stream(&self, token: Token) -> Vec<(Frame, bool)> {
        loop {
            let mut guard = self.lock();
            if !guard.registry.contains(token) {
                // Cancelled before admission ran.
                return Vec::new();
            }
            if guard.started_go_away {
                drop(guard);
                self.reject_stream(token);
                return Vec::new();
            }
            if guard.registry.ids_exhausted() {
                drop(guard);
                self.start_go_away(
                    StreamId::MAX,
                    Status::internal("Stream ids exhausted"),
                    None,
                );
                continue;
            }
            // Queue behind a non-empty pending queue even when capacity is
            // momentarily free, so admission stays FIFO.
            if !guard.registry.has_capacity() || guard.registry.has_pending() {
                guard.registry.push_pending(token);
                return Vec::new();
            }
            return start_stream_locked(&mut guard, token);
        }
    }

    /// Process a DrainPending command: start pending streams FIFO while
    /// capacity and id space last.
    pub(crate) fn prepare_drain_pending(&self) -> Vec<(Frame, bool)> {
        let (frames, exhausted_with_pending) = {
            let mut guard = self.lock();
            if guard.started_go_away {
                return Vec::new();
            }
            let mut frames = Vec::new();
            while !guard.registry.ids_exhausted() {
                let Some(token) = guard.registry.pop_ready() else {
                    break;
                };
                frames.extend(start_stream_locked(&mut guard, token));
            }
            let exhausted = guard.registry.ids_exhausted() && guard.registry.has_pending();
            (frames, exhausted)
        };
        if exhausted_with_pending {
            self.start_go_away(
                StreamId::MAX,
                Status::internal("Stream ids exhausted"),
                None,
            );
        }
        frames
    }

    /// Attach a write failure to the stream the frame was written for.
    pub(crate) fn fail_stream_for_write(&self, token: Token, status: Status) {
        self.finish_stream(token, status, Metadata::new(), None);
    }

    pub(crate) fn initial_settings(&self) -> Settings {
        let mut settings = Settings::new();
        settings.set_enable_push(false);
        settings.set_initial_window_size(Some(self.config.initial_window_size));
        settings.set_max_header_list_size(Some(self.config.max_header_list_size));
        settings
    }
}

/// Assign an id to `token` and emit its HEADERS plus any data the call
/// already submitted. The caller holds the lock.
fn start_stream_locked(inner: &mut Inner, token: Token) -> Vec<(Frame, bool)> {
    let Some(id) = inner.registry.assign_id(token) else {
        return Vec::new();
    };
    let initial_window = inner.flow.initial_window();
    let Some(state) = inner.registry.get_mut(token) else {
        return Vec::new();
    };
    state.send.reseed(initial_window);
    let Some((pseudo, fields)) = state.take_request() else {
        return Vec::new();
    };
    tracing::trace!(id = id.value(), "starting stream");
    let headers = Headers::new(id, pseudo, fields);
    let flush_headers = state.flush_headers();
    let chunks = inner.flow.drain(&mut state.send);

    let mut frames = Vec::with_capacity(1 + chunks.len());
    frames.push((headers.into(), flush_headers && chunks.is_empty()));
    let last = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut data = Data::new(id, chunk.payload);
        data.set_end_stream(chunk.end_stream);
        frames.push((data.into(), i + 1 == last));
    }
    frames
}

pub(crate) fn enqueue_data_chunks(
    queue: &WriteQueue,
    id: StreamId,
    token: Token,
    chunks: Vec<crate::proto::flow_control::Chunk>,
) {
    let last = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut data = Data::new(id, chunk.payload);
        data.set_end_stream(chunk.end_stream);
        queue.enqueue(data.into(), i + 1 == last, Some(token));
    }
}

/// Emit flow-unblocked data for every stream that has some, in id order.
/// The caller holds the lock.
pub(crate) fn drain_all_streams_locked(shared: &Shared, inner: &mut Inner) {
    for token in inner.registry.tokens_with_queued_data() {
        let Some(state) = inner.registry.get_mut(token) else {
            continue;
        };
        let Some(id) = state.id() else {
            continue;
        };
        let chunks = inner.flow.drain(&mut state.send);
        enqueue_data_chunks(&shared.queue, id, token, chunks);
    }
}

// ===== connection driver =====

/// Connect, negotiate, write the preface and initial SETTINGS, then run the
/// reader loop until the connection is done. The driver is the single place
/// `transport_terminated` is emitted.
pub(crate) async fn run_driver<N, C>(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    negotiator: N,
    codec: C,
) where
    N: Negotiate,
    C: FrameCodec<N::Io>,
{
    match connect(&shared, negotiator, codec).await {
        Ok((reader, writer)) => {
            let writer_task = tokio::spawn(run_writer(shared.clone(), rx, writer));
            run_reader(&shared, reader).await;
            let _ = writer_task.await;
        }
        Err(status) => {
            tracing::debug!(%status, "connection setup failed");
            shared.on_exception(status.clone());
            // The writer task never ran; fail everything it would have
            // consumed.
            rx.close();
            while let Ok(command) = rx.try_recv() {
                fail_command(&shared, command);
            }
        }
    }

    {
        let mut inner = shared.lock();
        inner.lifecycle = Lifecycle::Terminated;
    }
    tracing::debug!("transport terminated");
    shared.notify_terminated();
}

async fn connect<N, C>(
    shared: &Shared,
    negotiator: N,
    codec: C,
) -> Result<(<C as FrameCodec<N::Io>>::Reader, <C as FrameCodec<N::Io>>::Writer), Status>
where
    N: Negotiate,
    C: FrameCodec<N::Io>,
{
    tracing::debug!(addr = %shared.config.addr, "connecting");
    let tcp = TcpStream::connect(&shared.config.addr).await.map_err(|e| {
        Status::unavailable(format!("failed to connect to {}", shared.config.addr)).with_source(e)
    })?;
    let _ = tcp.set_nodelay(true);

    // shutdown() may have raced the connect; the fresh socket is ours to
    // close, which dropping it does.
    {
        let inner = shared.lock();
        if inner.started_go_away {
            return Err(inner
                .go_away_status
                .clone()
                .unwrap_or_else(|| Status::unavailable("Transport stopped")));
        }
    }

    let mut io = negotiator.negotiate(tcp, &shared.config.authority).await?;

    let preface_err =
        |e: io::Error| Status::unavailable("failed to write connection preface").with_source(e);
    io.write_all(&PREFACE).await.map_err(preface_err)?;
    io.flush().await.map_err(preface_err)?;

    let (reader, mut writer) = codec.bind(io);
    let settings = shared.initial_settings();
    tracing::debug!(?settings, "sending initial settings");
    let settings_err =
        |e: io::Error| Status::unavailable("failed to write initial settings").with_source(e);
    writer
        .write_frame(settings.into())
        .await
        .map_err(settings_err)?;
    writer.flush().await.map_err(settings_err)?;
    Ok((reader, writer))
}

async fn run_reader<R: FrameReader>(shared: &Shared, mut reader: R) {
    loop {
        match reader.next_frame().await {
            Ok(Some(frame)) => {
                if let Err(error) = shared.handle_frame(frame) {
                    tracing::debug!(reason = ?error.reason, message = %error.message, "connection error");
                    shared.queue.enqueue(
                        GoAway::with_debug_data(
                            StreamId::ZERO,
                            error.reason,
                            Bytes::from(error.message.clone()),
                        )
                        .into(),
                        true,
                        None,
                    );
                    shared.on_exception(Status::internal(error.message));
                    break;
                }
            }
            Ok(None) => {
                shared.start_go_away(
                    StreamId::ZERO,
                    Status::unavailable("End of stream or IOException"),
                    None,
                );
                break;
            }
            Err(ReadError::Io(e)) => {
                shared.on_exception(
                    Status::unavailable("connection read failed").with_source(e),
                );
                break;
            }
            Err(ReadError::Protocol { reason, message }) => {
                shared.queue.enqueue(
                    GoAway::with_debug_data(StreamId::ZERO, reason, Bytes::from(message.clone()))
                        .into(),
                    true,
                    None,
                );
                shared.on_exception(Status::internal(message));
                break;
            }
        }
    }
}

/// The writer task: executes queued commands in submission order. After the
/// first write failure it keeps draining (completing handles with the
/// failure) until told to shut down.
async fn run_writer<W: FrameWriter>(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut writer: W,
) {
    let mut write_failed = false;
    while let Some(command) = rx.recv().await {
        match command {
            Command::Frame {
                frame,
                flush,
                on_behalf,
                done,
            } => {
                if write_failed {
                    if let Some(done) = done {
                        let _ = done.send(Err(aborted()));
                    }
                    continue;
                }
                let result = write_one(&mut writer, frame, flush).await;
                match result {
                    Ok(()) => {
                        if let Some(done) = done {
                            let _ = done.send(Ok(()));
                        }
                    }
                    Err(e) => {
                        let status =
                            Status::unavailable("connection write failed").with_source(e);
                        if let Some(done) = done {
                            let _ = done.send(Err(aborted()));
                        }
                        if let Some(token) = on_behalf {
                            shared.fail_stream_for_write(token, status.clone());
                        }
                        write_failed = true;
                        shared.on_exception(status);
                    }
                }
            }
            Command::CreateStream(token) => {
                let frames = shared.prepare_create_stream(token);
                if !write_failed && write_batch(&shared, &mut writer, frames).await.is_err() {
                    write_failed = true;
                }
            }
            Command::DrainPending => {
                let frames = shared.prepare_drain_pending();
                if !write_failed && write_batch(&shared, &mut writer, frames).await.is_err() {
                    write_failed = true;
                }
            }
            Command::Shutdown => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        tracing::trace!(error = %e, "error closing connection");
    }

    // Nothing consumes the queue anymore; fail whatever is left so every
    // stream still reports a terminal status.
    rx.close();
    while let Ok(command) = rx.try_recv() {
        fail_command(&shared, command);
    }
}

async fn write_one<W: FrameWriter>(writer: &mut W, frame: Frame, flush: bool) -> io::Result<()> {
    writer.write_frame(frame).await?;
    if flush {
        writer.flush().await?;
    }
    Ok(())
}

async fn write_batch<W: FrameWriter>(
    shared: &Shared,
    writer: &mut W,
    frames: Vec<(Frame, bool)>,
) -> Result<(), ()> {
    for (frame, flush) in frames {
        if let Err(e) = write_one(writer, frame, flush).await {
            let status = Status::unavailable("connection write failed").with_source(e);
            shared.on_exception(status);
            return Err(());
        }
    }
    Ok(())
}

fn fail_command(shared: &Shared, command: Command) {
    match command {
        Command::Frame { done, .. } => {
            if let Some(done) = done {
                let _ = done.send(Err(aborted()));
            }
        }
        // With go-away in force this rejects the stream with the terminal
        // status instead of starting it.
        Command::CreateStream(token) => {
            let frames = shared.prepare_create_stream(token);
            debug_assert!(frames.is_empty());
        }
        Command::DrainPending | Command::Shutdown => {}
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "transport is stopped")
}
