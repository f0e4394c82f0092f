/// A PING frame: an 8-byte opaque payload, optionally flagged as an ACK.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ping {
    ack: bool,
    payload: [u8; 8],
}

impl Ping {
    /// A PING request carrying the given payload.
    #[must_use]
    pub fn new(payload: [u8; 8]) -> Self {
        Self {
            ack: false,
            payload,
        }
    }

    /// A PING acknowledgement echoing the given payload.
    #[must_use]
    pub fn pong(payload: [u8; 8]) -> Self {
        Self { ack: true, payload }
    }

    /// Whether the ACK flag is set.
    #[must_use]
    pub fn is_ack(&self) -> bool {
        self.ack
    }

    /// The opaque payload.
    #[must_use]
    pub fn payload(&self) -> [u8; 8] {
        self.payload
    }
}
