use std::fmt;

use http::header::HeaderMap;

use super::StreamId;

/// A PUSH_PROMISE frame: a server-initiated stream reservation.
///
/// A client transport never accepts these; the promised stream is refused.
#[derive(Clone, Eq, PartialEq)]
pub struct PushPromise {
    stream_id: StreamId,
    promised_id: StreamId,
    fields: HeaderMap,
}

impl PushPromise {
    /// Create a PUSH_PROMISE frame.
    #[must_use]
    pub fn new(stream_id: StreamId, promised_id: StreamId, fields: HeaderMap) -> Self {
        Self {
            stream_id,
            promised_id,
            fields,
        }
    }

    /// The associated (existing) stream.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The stream the peer attempted to reserve.
    #[must_use]
    pub fn promised_id(&self) -> StreamId {
        self.promised_id
    }

    /// The promised request header fields.
    #[must_use]
    pub fn fields(&self) -> &HeaderMap {
        &self.fields
    }
}

impl fmt::Debug for PushPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushPromise")
            .field("stream_id", &self.stream_id)
            .field("promised_id", &self.promised_id)
            .finish_non_exhaustive()
    }
}
