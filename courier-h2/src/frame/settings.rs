use std::fmt;

/// The initial window size for stream-level and connection-level flow
/// control, before any SETTINGS or WINDOW_UPDATE changes it.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;

/// The largest DATA payload an endpoint accepts until SETTINGS raises it.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// A SETTINGS frame: either an acknowledgement, or a set of parameter
/// updates where unset parameters keep their previous value.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Settings {
    ack: bool,
    header_table_size: Option<u32>,
    enable_push: Option<bool>,
    max_concurrent_streams: Option<u32>,
    initial_window_size: Option<u32>,
    max_frame_size: Option<u32>,
    max_header_list_size: Option<u32>,
}

impl Settings {
    /// An empty (non-ACK) SETTINGS frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A SETTINGS acknowledgement frame.
    #[must_use]
    pub fn ack() -> Self {
        Self {
            ack: true,
            ..Self::default()
        }
    }

    /// Whether the ACK flag is set.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.ack
    }

    /// SETTINGS_HEADER_TABLE_SIZE, if present.
    #[must_use]
    pub fn header_table_size(&self) -> Option<u32> {
        self.header_table_size
    }

    /// Set SETTINGS_HEADER_TABLE_SIZE.
    pub fn set_header_table_size(&mut self, size: Option<u32>) {
        self.header_table_size = size;
    }

    /// SETTINGS_ENABLE_PUSH, if present.
    #[must_use]
    pub fn is_push_enabled(&self) -> Option<bool> {
        self.enable_push
    }

    /// Set SETTINGS_ENABLE_PUSH.
    pub fn set_enable_push(&mut self, enabled: bool) {
        self.enable_push = Some(enabled);
    }

    /// SETTINGS_MAX_CONCURRENT_STREAMS, if present.
    #[must_use]
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Set SETTINGS_MAX_CONCURRENT_STREAMS.
    pub fn set_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.max_concurrent_streams = max;
    }

    /// SETTINGS_INITIAL_WINDOW_SIZE, if present.
    #[must_use]
    pub fn initial_window_size(&self) -> Option<u32> {
        self.initial_window_size
    }

    /// Set SETTINGS_INITIAL_WINDOW_SIZE.
    pub fn set_initial_window_size(&mut self, size: Option<u32>) {
        self.initial_window_size = size;
    }

    /// SETTINGS_MAX_FRAME_SIZE, if present.
    #[must_use]
    pub fn max_frame_size(&self) -> Option<u32> {
        self.max_frame_size
    }

    /// Set SETTINGS_MAX_FRAME_SIZE.
    pub fn set_max_frame_size(&mut self, size: Option<u32>) {
        self.max_frame_size = size;
    }

    /// SETTINGS_MAX_HEADER_LIST_SIZE, if present.
    #[must_use]
    pub fn max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    /// Set SETTINGS_MAX_HEADER_LIST_SIZE.
    pub fn set_max_header_list_size(&mut self, size: Option<u32>) {
        self.max_header_list_size = size;
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Settings");
        if self.ack {
            builder.field("ack", &true);
        }
        if let Some(v) = self.header_table_size {
            builder.field("header_table_size", &v);
        }
        if let Some(v) = self.enable_push {
            builder.field("enable_push", &v);
        }
        if let Some(v) = self.max_concurrent_streams {
            builder.field("max_concurrent_streams", &v);
        }
        if let Some(v) = self.initial_window_size {
            builder.field("initial_window_size", &v);
        }
        if let Some(v) = self.max_frame_size {
            builder.field("max_frame_size", &v);
        }
        if let Some(v) = self.max_header_list_size {
            builder.field("max_header_list_size", &v);
        }
        builder.finish()
    }
}
