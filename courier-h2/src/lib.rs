//! Client-side HTTP/2 transport for the courier RPC framework.
//!
//! One [`Transport`] owns one TCP (optionally TLS) connection to a single
//! endpoint and multiplexes RPC calls over it as HTTP/2 streams. For each
//! call it carries request headers, request message bytes, response headers,
//! response message bytes and a terminal [`Status`], while enforcing HTTP/2
//! flow control, concurrent-stream limits, ping round trips and graceful
//! shutdown.
//!
//! The transport consumes an abstract [frame codec](codec) rather than
//! serializing frames itself, and reports lifecycle transitions to a
//! [`TransportListener`]. Server-initiated streams, stream priority and
//! connection pooling are out of scope: one transport is one connection,
//! and a failed transport is replaced by whoever manages it.
//!
//! ```no_run
//! # use courier_h2::{Transport, TransportListener, Plaintext, StreamEvent};
//! # use courier_rpc::{Metadata, MethodDescriptor, MethodKind, Status};
//! # async fn run<C>(codec: C) where C: courier_h2::codec::FrameCodec<tokio::net::TcpStream> {
//! struct Log;
//! impl TransportListener for Log {
//!     fn transport_ready(&self) {}
//!     fn transport_shutdown(&self, _status: Status) {}
//!     fn transport_terminated(&self) {}
//! }
//!
//! let transport = Transport::builder("127.0.0.1:50051", "svc.example.com").build();
//! transport.start(Plaintext, codec, Log);
//!
//! let method = MethodDescriptor::new("pkg.Service/Call", MethodKind::Unary);
//! let mut stream = transport.new_stream(method, Metadata::new());
//! stream.send_message(bytes::Bytes::from_static(b"hi"), true);
//! while let Some(event) = stream.next_event().await {
//!     if let StreamEvent::Closed { status, .. } = event {
//!         println!("call finished: {status}");
//!         break;
//!     }
//! }
//! transport.shutdown();
//! # }
//! ```

pub mod codec;
pub mod frame;

mod client;
mod negotiator;
mod proto;
mod stream;

pub use client::{Builder, Transport, TransportListener};
#[cfg(feature = "tls")]
pub use negotiator::Tls;
pub use negotiator::{Negotiate, Plaintext, PlaintextUpgrade, Rewind};
pub use stream::{ClientStream, StreamEvent};

pub use courier_rpc::Status;
