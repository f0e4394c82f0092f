use std::fmt;

use bytes::Bytes;

use super::StreamId;

/// Message payload bytes for a stream.
#[derive(Clone, Eq, PartialEq)]
pub struct Data {
    stream_id: StreamId,
    payload: Bytes,
    end_stream: bool,
}

impl Data {
    /// Create a DATA frame for the given stream.
    #[must_use]
    pub fn new(stream_id: StreamId, payload: Bytes) -> Self {
        Self {
            stream_id,
            payload,
            end_stream: false,
        }
    }

    /// The stream ID this frame belongs to.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Whether the END_STREAM flag is set.
    #[must_use]
    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    /// Set the END_STREAM flag.
    pub fn set_end_stream(&mut self, end_stream: bool) {
        self.end_stream = end_stream;
    }

    /// The payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("stream_id", &self.stream_id)
            .field("len", &self.payload.len())
            .field("end_stream", &self.end_stream)
            .finish()
    }
}
