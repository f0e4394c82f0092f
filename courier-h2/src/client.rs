use std::sync::Arc;
use std::time::Duration;

use courier_rpc::{Metadata, MethodDescriptor, Status};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::codec::FrameCodec;
use crate::frame::{DEFAULT_INITIAL_WINDOW_SIZE, StreamId};
use crate::negotiator::Negotiate;
use crate::proto::transport::{Config, Lifecycle, Shared, run_driver};
use crate::proto::write_queue::{Command, WriteQueue};
use crate::stream::ClientStream;

/// Observes the transport's lifecycle.
///
/// `transport_ready` fires once, when the peer's first SETTINGS frame
/// arrives. `transport_shutdown` fires exactly once with the transport's
/// terminal status, strictly before `transport_terminated`, which fires once
/// no more I/O will occur and every stream has reported a final status.
pub trait TransportListener: Send + Sync + 'static {
    fn transport_ready(&self);
    fn transport_shutdown(&self, status: Status);
    fn transport_terminated(&self);
}

/// Configures a [`Transport`].
#[derive(Debug)]
pub struct Builder {
    addr: String,
    authority: String,
    scheme: String,
    initial_window_size: u32,
    max_message_size: usize,
    max_header_list_size: u32,
    initial_stream_id: StreamId,
}

impl Builder {
    fn new(addr: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            authority: authority.into(),
            scheme: "http".to_owned(),
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_message_size: 4 * 1024 * 1024,
            max_header_list_size: 8 * 1024,
            initial_stream_id: StreamId::FIRST_CLIENT,
        }
    }

    /// The `:scheme` pseudo-header value for requests; use `"https"` with a
    /// TLS negotiator. Defaults to `"http"`.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// The per-stream receive window advertised to the peer. Defaults to
    /// the protocol's 65,535.
    #[must_use]
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.initial_window_size = size;
        self
    }

    /// Bound on a stream's delivered-but-undrained inbound bytes; a stream
    /// exceeding it fails with RESOURCE_EXHAUSTED. Defaults to 4 MiB.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// SETTINGS_MAX_HEADER_LIST_SIZE advertised to the peer. Defaults to
    /// 8 KiB.
    #[must_use]
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.max_header_list_size = size;
        self
    }

    /// The first stream id this transport assigns. Deployments that reach
    /// HTTP/2 via an HTTP/1.1 Upgrade have already spent stream 1.
    ///
    /// # Panics
    ///
    /// If `id` is not an odd client-side id of at least 3.
    #[must_use]
    pub fn initial_stream_id(mut self, id: StreamId) -> Self {
        assert!(
            id.is_client_initiated() && id.value() >= StreamId::FIRST_CLIENT.value(),
            "initial stream id must be odd and at least 3",
        );
        self.initial_stream_id = id;
        self
    }

    /// Build the transport. It does nothing until [`Transport::start`].
    #[must_use]
    pub fn build(self) -> Transport {
        let (queue, commands) = WriteQueue::new();
        let shared = Shared::new(
            Config {
                addr: self.addr,
                authority: self.authority,
                scheme: self.scheme,
                initial_window_size: self.initial_window_size,
                max_message_size: self.max_message_size,
                max_header_list_size: self.max_header_list_size,
                initial_stream_id: self.initial_stream_id,
            },
            queue,
        );
        Transport {
            shared: Arc::new(shared),
            commands: Mutex::new(Some(commands)),
        }
    }
}

/// A client-side HTTP/2 transport: one connection to one endpoint, carrying
/// many concurrent RPC calls as HTTP/2 streams.
///
/// The transport is single-use: [`start`](Transport::start) once, create
/// streams while it is up, [`shutdown`](Transport::shutdown) when done.
/// There is no reconnection; a failed transport is replaced, not revived.
#[derive(Debug)]
pub struct Transport {
    shared: Arc<Shared>,
    commands: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
}

impl Transport {
    /// Configure a transport for `addr` (a `host:port` dial target) using
    /// `authority` as the default `:authority` for requests.
    pub fn builder(addr: impl Into<String>, authority: impl Into<String>) -> Builder {
        Builder::new(addr, authority)
    }

    /// Begin connecting in the background. One-shot: later calls are
    /// ignored.
    ///
    /// The `negotiator` brings the TCP socket to an HTTP/2-ready
    /// bytestream, the `codec` frames it, and `listener` observes the
    /// transport lifecycle. Calls may be created immediately; anything
    /// submitted before the connection is ready is buffered in order.
    pub fn start<N, C, L>(&self, negotiator: N, codec: C, listener: L)
    where
        N: Negotiate,
        C: FrameCodec<N::Io>,
        L: TransportListener,
    {
        let Some(commands) = self.commands.lock().take() else {
            tracing::warn!("transport already started");
            return;
        };
        {
            let mut inner = self.shared.lock();
            if inner.lifecycle == Lifecycle::New {
                inner.lifecycle = Lifecycle::Connecting;
            }
        }
        self.shared.install_listener(Box::new(listener));
        // A shutdown() that raced ahead of start() still owes the listener
        // its callback; the driver below only reports termination.
        let missed = {
            let inner = self.shared.lock();
            if inner.started_go_away {
                Some(
                    inner
                        .go_away_status
                        .clone()
                        .unwrap_or_else(|| Status::unavailable("Transport stopped")),
                )
            } else {
                None
            }
        };
        if let Some(status) = missed {
            self.shared.notify_shutdown_once(status);
        }
        tokio::spawn(run_driver(self.shared.clone(), commands, negotiator, codec));
    }

    /// Create a stream for one RPC call.
    ///
    /// Returns immediately. If the call cannot be carried (the transport is
    /// going away, the id space is spent, admission fails), the stream
    /// reports the status through its event channel; no error escapes here.
    ///
    /// Any [`AUTHORITY_OVERRIDE_KEY`] entry is stripped from `metadata` and
    /// becomes the `:authority` pseudo-header for this call.
    ///
    /// [`AUTHORITY_OVERRIDE_KEY`]: courier_rpc::AUTHORITY_OVERRIDE_KEY
    pub fn new_stream(&self, method: MethodDescriptor, metadata: Metadata) -> ClientStream {
        self.shared.new_stream(method, metadata)
    }

    /// Measure a round trip to the peer.
    ///
    /// At most one PING is in flight per transport; concurrent callers
    /// share the outstanding round trip and observe the same elapsed time.
    pub async fn ping(&self) -> Result<Duration, Status> {
        self.shared.ping().await
    }

    /// Shut down gracefully: tell the peer we are going away, let active
    /// streams run to completion, then close the connection. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}
