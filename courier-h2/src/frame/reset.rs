use super::{Reason, StreamId};

/// A RST_STREAM frame, terminating one stream with an error code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Reset {
    stream_id: StreamId,
    error_code: Reason,
}

impl Reset {
    /// Create a RST_STREAM frame for the given stream.
    #[must_use]
    pub fn new(stream_id: StreamId, error_code: Reason) -> Self {
        Self {
            stream_id,
            error_code,
        }
    }

    /// The stream being reset.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The error code.
    #[must_use]
    pub fn reason(&self) -> Reason {
        self.error_code
    }
}
