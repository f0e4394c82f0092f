//! The typed HTTP/2 frame model exchanged with the frame codec.
//!
//! These types carry decoded frame semantics only; serialization to and from
//! the RFC 7540 wire format is the codec's responsibility.

use std::fmt;

mod data;
mod go_away;
mod headers;
mod ping;
mod priority;
mod push_promise;
mod reason;
mod reset;
mod settings;
mod stream_id;
mod window_update;

pub use data::Data;
pub use go_away::GoAway;
pub use headers::{Headers, Pseudo};
pub use ping::Ping;
pub use priority::Priority;
pub use push_promise::PushPromise;
pub use reason::Reason;
pub use reset::Reset;
pub use settings::{DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE, Settings};
pub use stream_id::{StreamId, StreamIdOverflow};
pub use window_update::WindowUpdate;

/// One decoded HTTP/2 frame.
#[derive(Clone, PartialEq)]
pub enum Frame {
    Data(Data),
    Headers(Headers),
    Settings(Settings),
    Ping(Ping),
    Reset(Reset),
    WindowUpdate(WindowUpdate),
    GoAway(GoAway),
    PushPromise(PushPromise),
    Priority(Priority),
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(frame) => fmt::Debug::fmt(frame, f),
            Self::Headers(frame) => fmt::Debug::fmt(frame, f),
            Self::Settings(frame) => fmt::Debug::fmt(frame, f),
            Self::Ping(frame) => fmt::Debug::fmt(frame, f),
            Self::Reset(frame) => fmt::Debug::fmt(frame, f),
            Self::WindowUpdate(frame) => fmt::Debug::fmt(frame, f),
            Self::GoAway(frame) => fmt::Debug::fmt(frame, f),
            Self::PushPromise(frame) => fmt::Debug::fmt(frame, f),
            Self::Priority(frame) => fmt::Debug::fmt(frame, f),
        }
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Self {
        Self::Data(src)
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Self {
        Self::Headers(src)
    }
}

impl From<Settings> for Frame {
    fn from(src: Settings) -> Self {
        Self::Settings(src)
    }
}

impl From<Ping> for Frame {
    fn from(src: Ping) -> Self {
        Self::Ping(src)
    }
}

impl From<Reset> for Frame {
    fn from(src: Reset) -> Self {
        Self::Reset(src)
    }
}

impl From<WindowUpdate> for Frame {
    fn from(src: WindowUpdate) -> Self {
        Self::WindowUpdate(src)
    }
}

impl From<GoAway> for Frame {
    fn from(src: GoAway) -> Self {
        Self::GoAway(src)
    }
}

impl From<PushPromise> for Frame {
    fn from(src: PushPromise) -> Self {
        Self::PushPromise(src)
    }
}

impl From<Priority> for Frame {
    fn from(src: Priority) -> Self {
        Self::Priority(src)
    }
}
