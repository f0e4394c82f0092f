//! RPC framework types shared by the courier transport crates.
//!
//! This crate holds the vocabulary spoken between an RPC call object and the
//! transport that carries it: the terminal [`Status`] of a call, the
//! [`Metadata`] attached to requests and responses, and the
//! [`MethodDescriptor`] naming the remote procedure.

mod metadata;
mod method;
mod status;

pub use metadata::{
    AUTHORITY_OVERRIDE_KEY, GRPC_CONTENT_TYPE, GRPC_MESSAGE_HEADER, GRPC_STATUS_HEADER, Metadata,
    TE_TRAILERS,
};
pub use method::{MethodDescriptor, MethodKind};
pub use status::{Code, Status};
