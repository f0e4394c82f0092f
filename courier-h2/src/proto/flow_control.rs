use std::collections::VecDeque;

use bytes::Bytes;

use crate::frame::{DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE};

/// The largest flow-control window RFC 7540 permits.
const MAX_WINDOW_SIZE: i64 = (1 << 31) - 1;

/// Outbound flow-control accounting for the connection.
///
/// Holds the connection-scope window plus the peer-advertised per-stream
/// baseline; the per-stream window and pending-data queue live in
/// [`SendState`], one per stream. DATA is debited against the minimum of the
/// stream window, the connection window and the peer's max frame size; bytes
/// without credit queue on the stream and drain greedily as credit arrives.
#[derive(Debug)]
pub(crate) struct FlowController {
    /// Connection-scope send window, credited only by WINDOW_UPDATE(0, n).
    connection_window: i64,
    /// The peer's SETTINGS_INITIAL_WINDOW_SIZE; seeds new stream windows.
    initial_window: u32,
    /// The peer's SETTINGS_MAX_FRAME_SIZE; bounds each DATA chunk.
    max_frame_size: u32,
}

/// Per-stream outbound flow-control state.
#[derive(Debug)]
pub(crate) struct SendState {
    /// Stream-scope send window. May go negative after the peer shrinks
    /// SETTINGS_INITIAL_WINDOW_SIZE.
    window: i64,
    /// Submitted data not yet emitted, in submission order.
    queued: VecDeque<QueuedData>,
    /// Whether the local side has submitted its final byte.
    local_closed: bool,
}

#[derive(Debug)]
struct QueuedData {
    payload: Bytes,
    end_stream: bool,
}

/// One DATA payload cleared for emission.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub(crate) payload: Bytes,
    pub(crate) end_stream: bool,
}

/// Outcome of crediting a window.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Credit {
    Applied,
    /// The credit would push the window past 2^31-1.
    Overflow,
}

impl FlowController {
    pub(crate) fn new() -> Self {
        Self {
            connection_window: i64::from(DEFAULT_INITIAL_WINDOW_SIZE),
            initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// The per-stream window baseline new streams start from.
    pub(crate) fn initial_window(&self) -> u32 {
        self.initial_window
    }

    /// Apply a SETTINGS_INITIAL_WINDOW_SIZE change and return the delta to
    /// add to every active stream's window.
    pub(crate) fn set_initial_window(&mut self, size: u32) -> i64 {
        let delta = i64::from(size) - i64::from(self.initial_window);
        self.initial_window = size;
        delta
    }

    pub(crate) fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    /// Credit the connection-scope window.
    pub(crate) fn credit_connection(&mut self, increment: u32) -> Credit {
        let next = self.connection_window + i64::from(increment);
        if next > MAX_WINDOW_SIZE {
            return Credit::Overflow;
        }
        self.connection_window = next;
        Credit::Applied
    }

    /// Emit as much of the stream's queued data as current credit allows.
    ///
    /// Chunks come out in submission order, each no larger than the peer's
    /// max frame size. An empty payload flagged end-of-stream is emitted
    /// without consuming window.
    pub(crate) fn drain(&mut self, send: &mut SendState) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        while let Some(front) = send.queued.front_mut() {
            if front.payload.is_empty() {
                let end_stream = front.end_stream;
                send.queued.pop_front();
                if end_stream {
                    chunks.push(Chunk {
                        payload: Bytes::new(),
                        end_stream: true,
                    });
                }
                continue;
            }

            let window = self.connection_window.min(send.window).max(0) as usize;
            let allowed = front
                .payload
                .len()
                .min(window)
                .min(self.max_frame_size as usize);
            if allowed == 0 {
                break;
            }

            let payload = front.payload.split_to(allowed);
            self.connection_window -= allowed as i64;
            send.window -= allowed as i64;

            let end_stream = front.end_stream && front.payload.is_empty();
            if front.payload.is_empty() {
                send.queued.pop_front();
            }
            chunks.push(Chunk {
                payload,
                end_stream,
            });
        }
        chunks
    }
}

impl SendState {
    /// A fresh stream window seeded from the peer's current baseline.
    pub(crate) fn new(initial_window: u32) -> Self {
        Self {
            window: i64::from(initial_window),
            queued: VecDeque::new(),
            local_closed: false,
        }
    }

    /// Queue outbound payload behind any data already waiting.
    pub(crate) fn push(&mut self, payload: Bytes, end_stream: bool) {
        self.queued.push_back(QueuedData {
            payload,
            end_stream,
        });
    }

    /// Credit the stream window.
    pub(crate) fn credit(&mut self, increment: u32) -> Credit {
        let next = self.window + i64::from(increment);
        if next > MAX_WINDOW_SIZE {
            return Credit::Overflow;
        }
        self.window = next;
        Credit::Applied
    }

    /// Shift the window by a SETTINGS_INITIAL_WINDOW_SIZE delta.
    pub(crate) fn adjust(&mut self, delta: i64) {
        self.window += delta;
    }

    /// Reset the window to the peer's current baseline. Used when the
    /// stream actually starts; baseline changes while it was waiting for
    /// admission only reach started streams.
    pub(crate) fn reseed(&mut self, initial_window: u32) {
        self.window = i64::from(initial_window);
    }

    pub(crate) fn has_queued(&self) -> bool {
        !self.queued.is_empty()
    }

    pub(crate) fn is_local_closed(&self) -> bool {
        self.local_closed
    }

    pub(crate) fn close_local(&mut self) {
        self.local_closed = true;
    }
}
