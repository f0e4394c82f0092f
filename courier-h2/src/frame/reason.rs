use std::fmt;

use courier_rpc::Status;

/// HTTP/2 error codes.
///
/// Error codes are used in `RST_STREAM` and `GOAWAY` frames to convey the
/// reasons for the stream or connection error. See [Section 7] of RFC 7540.
///
/// [Section 7]: https://tools.ietf.org/html/rfc7540#section-7
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Reason(u32);

impl Reason {
    /// The associated condition is not a result of an error.
    pub const NO_ERROR: Self = Self(0);
    /// The endpoint detected an unspecific protocol error.
    pub const PROTOCOL_ERROR: Self = Self(1);
    /// The endpoint encountered an unexpected internal error.
    pub const INTERNAL_ERROR: Self = Self(2);
    /// The endpoint detected that its peer violated the flow-control protocol.
    pub const FLOW_CONTROL_ERROR: Self = Self(3);
    /// The endpoint sent a SETTINGS frame but did not receive a response in
    /// a timely manner.
    pub const SETTINGS_TIMEOUT: Self = Self(4);
    /// The endpoint received a frame after a stream was half-closed.
    pub const STREAM_CLOSED: Self = Self(5);
    /// The endpoint received a frame with an invalid size.
    pub const FRAME_SIZE_ERROR: Self = Self(6);
    /// The endpoint refused the stream prior to performing any application
    /// processing.
    pub const REFUSED_STREAM: Self = Self(7);
    /// Used by the endpoint to indicate that the stream is no longer needed.
    pub const CANCEL: Self = Self(8);
    /// The endpoint is unable to maintain the header compression context for
    /// the connection.
    pub const COMPRESSION_ERROR: Self = Self(9);
    /// The connection established in response to a CONNECT request was reset
    /// or abnormally closed.
    pub const CONNECT_ERROR: Self = Self(10);
    /// The endpoint detected that its peer is exhibiting a behavior that
    /// might be generating excessive load.
    pub const ENHANCE_YOUR_CALM: Self = Self(11);
    /// The underlying transport has properties that do not meet minimum
    /// security requirements.
    pub const INADEQUATE_SECURITY: Self = Self(12);
    /// The endpoint requires that HTTP/1.1 be used instead of HTTP/2.
    pub const HTTP_1_1_REQUIRED: Self = Self(13);

    /// Get a string description of the error code.
    #[must_use]
    pub fn description(&self) -> &str {
        match self.0 {
            0 => "not a result of an error",
            1 => "unspecific protocol error detected",
            2 => "unexpected internal error encountered",
            3 => "flow-control protocol violated",
            4 => "settings ACK not received in timely manner",
            5 => "received frame when stream half-closed",
            6 => "frame with invalid size",
            7 => "refused stream before processing any application logic",
            8 => "stream no longer needed",
            9 => "unable to maintain the header compression context",
            10 => "connection established in response to a CONNECT request was reset or abnormally closed",
            11 => "detected excessive load generating behavior",
            12 => "security properties do not meet minimum requirements",
            13 => "endpoint requires HTTP/1.1",
            _ => "unknown reason",
        }
    }

    /// Map this error code to the RPC status reported to streams it fails.
    ///
    /// Follows the gRPC HTTP/2 error-code mapping: codes outside the mapped
    /// set yield UNKNOWN with the raw value in the message.
    #[must_use]
    pub fn rpc_status(&self) -> Status {
        match *self {
            Self::NO_ERROR => {
                Status::internal("No error: A GRPC status of OK should have been sent")
            }
            Self::PROTOCOL_ERROR => Status::internal("Protocol error"),
            Self::INTERNAL_ERROR => Status::internal("Internal error"),
            Self::FLOW_CONTROL_ERROR => Status::internal("Flow control error"),
            Self::STREAM_CLOSED => Status::internal("Stream closed"),
            Self::FRAME_SIZE_ERROR => Status::internal("Frame too large"),
            Self::REFUSED_STREAM => Status::unavailable("Refused stream"),
            Self::CANCEL => Status::cancelled("Cancelled"),
            Self::COMPRESSION_ERROR => Status::internal("Compression error"),
            Self::CONNECT_ERROR => Status::internal("Connect error"),
            Self::ENHANCE_YOUR_CALM => Status::resource_exhausted("Enhance your calm"),
            Self::INADEQUATE_SECURITY => Status::permission_denied("Inadequate security"),
            Self(other) => Status::unknown(format!("Unknown http2 error code: {other}")),
        }
    }
}

impl From<u32> for Reason {
    fn from(src: u32) -> Self {
        Self(src)
    }
}

impl From<Reason> for u32 {
    fn from(src: Reason) -> Self {
        src.0
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "NO_ERROR",
            1 => "PROTOCOL_ERROR",
            2 => "INTERNAL_ERROR",
            3 => "FLOW_CONTROL_ERROR",
            4 => "SETTINGS_TIMEOUT",
            5 => "STREAM_CLOSED",
            6 => "FRAME_SIZE_ERROR",
            7 => "REFUSED_STREAM",
            8 => "CANCEL",
            9 => "COMPRESSION_ERROR",
            10 => "CONNECT_ERROR",
            11 => "ENHANCE_YOUR_CALM",
            12 => "INADEQUATE_SECURITY",
            13 => "HTTP_1_1_REQUIRED",
            other => return write!(fmt, "Reason({other})"),
        };
        write!(fmt, "{name}")
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_rpc::Code;

    #[test]
    fn status_mapping_matches_grpc_table() {
        let cases = [
            (
                Reason::NO_ERROR,
                Code::Internal,
                "No error: A GRPC status of OK should have been sent",
            ),
            (Reason::PROTOCOL_ERROR, Code::Internal, "Protocol error"),
            (Reason::INTERNAL_ERROR, Code::Internal, "Internal error"),
            (
                Reason::FLOW_CONTROL_ERROR,
                Code::Internal,
                "Flow control error",
            ),
            (Reason::STREAM_CLOSED, Code::Internal, "Stream closed"),
            (Reason::FRAME_SIZE_ERROR, Code::Internal, "Frame too large"),
            (Reason::REFUSED_STREAM, Code::Unavailable, "Refused stream"),
            (Reason::CANCEL, Code::Cancelled, "Cancelled"),
            (
                Reason::COMPRESSION_ERROR,
                Code::Internal,
                "Compression error",
            ),
            (Reason::CONNECT_ERROR, Code::Internal, "Connect error"),
            (
                Reason::ENHANCE_YOUR_CALM,
                Code::ResourceExhausted,
                "Enhance your calm",
            ),
            (
                Reason::INADEQUATE_SECURITY,
                Code::PermissionDenied,
                "Inadequate security",
            ),
        ];

        for (reason, code, message) in cases {
            let status = reason.rpc_status();
            assert_eq!(status.code(), code, "{reason:?}");
            assert_eq!(status.message(), message, "{reason:?}");
        }
    }

    #[test]
    fn unmapped_codes_are_unknown() {
        let status = Reason::from(0xbeef).rpc_status();
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "Unknown http2 error code: 48879");

        // SETTINGS_TIMEOUT and HTTP_1_1_REQUIRED are outside the mapped set.
        assert_eq!(Reason::SETTINGS_TIMEOUT.rpc_status().code(), Code::Unknown);
        assert_eq!(
            Reason::HTTP_1_1_REQUIRED.rpc_status().code(),
            Code::Unknown
        );
    }
}
