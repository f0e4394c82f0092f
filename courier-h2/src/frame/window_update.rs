use super::StreamId;

/// A WINDOW_UPDATE frame, crediting flow-control window at stream scope or,
/// with stream ID zero, at connection scope.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WindowUpdate {
    stream_id: StreamId,
    size_increment: u32,
}

impl WindowUpdate {
    /// Create a WINDOW_UPDATE frame.
    #[must_use]
    pub fn new(stream_id: StreamId, size_increment: u32) -> Self {
        Self {
            stream_id,
            size_increment,
        }
    }

    /// The scope of the credit: a stream, or the connection when zero.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The number of bytes credited.
    #[must_use]
    pub fn size_increment(&self) -> u32 {
        self.size_increment
    }
}
