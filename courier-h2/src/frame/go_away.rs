use std::fmt;

use bytes::Bytes;

use super::{Reason, StreamId};

/// A GOAWAY frame, initiating connection shutdown.
///
/// `last_stream_id` is the highest peer-initiated stream ID the sender will
/// still honor; higher IDs were not and will not be processed.
#[derive(Clone, Eq, PartialEq)]
pub struct GoAway {
    last_stream_id: StreamId,
    error_code: Reason,
    debug_data: Bytes,
}

impl GoAway {
    /// Create a GOAWAY frame without debug data.
    #[must_use]
    pub fn new(last_stream_id: StreamId, reason: Reason) -> Self {
        Self {
            last_stream_id,
            error_code: reason,
            debug_data: Bytes::new(),
        }
    }

    /// Create a GOAWAY frame carrying opaque debug data.
    #[must_use]
    pub fn with_debug_data(last_stream_id: StreamId, reason: Reason, debug_data: Bytes) -> Self {
        Self {
            last_stream_id,
            error_code: reason,
            debug_data,
        }
    }

    /// The highest stream ID the sender will still honor.
    #[must_use]
    pub fn last_stream_id(&self) -> StreamId {
        self.last_stream_id
    }

    /// The error code.
    #[must_use]
    pub fn reason(&self) -> Reason {
        self.error_code
    }

    /// The opaque debug data, possibly empty.
    #[must_use]
    pub fn debug_data(&self) -> &Bytes {
        &self.debug_data
    }
}

impl fmt::Debug for GoAway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("GoAway");
        builder.field("error_code", &self.error_code);
        builder.field("last_stream_id", &self.last_stream_id);
        if !self.debug_data.is_empty() {
            builder.field("debug_data", &self.debug_data);
        }
        builder.finish()
    }
}
