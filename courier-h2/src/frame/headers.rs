use std::fmt;

use http::header::HeaderMap;
use http::{Method, StatusCode};

use super::StreamId;

/// A HEADERS frame: pseudo-header fields plus regular header fields.
///
/// Header-block fragmentation (CONTINUATION) is the frame codec's business;
/// a `Headers` value always carries the complete, decoded block.
#[derive(Clone, Eq, PartialEq)]
pub struct Headers {
    stream_id: StreamId,
    pseudo: Pseudo,
    fields: HeaderMap,
    end_stream: bool,
}

/// HTTP/2 pseudo-header fields.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Pseudo {
    method: Option<Method>,
    scheme: Option<String>,
    authority: Option<String>,
    path: Option<String>,
    status: Option<StatusCode>,
}

impl Headers {
    /// Create a request or response HEADERS frame.
    #[must_use]
    pub fn new(stream_id: StreamId, pseudo: Pseudo, fields: HeaderMap) -> Self {
        Self {
            stream_id,
            pseudo,
            fields,
            end_stream: false,
        }
    }

    /// Create a trailers HEADERS frame; trailers always end the stream.
    #[must_use]
    pub fn trailers(stream_id: StreamId, fields: HeaderMap) -> Self {
        Self {
            stream_id,
            pseudo: Pseudo::default(),
            fields,
            end_stream: true,
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

    /// The pseudo-header fields.
    #[must_use]
    pub fn pseudo(&self) -> &Pseudo {
        &self.pseudo
    }

    /// The regular header fields.
    #[must_use]
    pub fn fields(&self) -> &HeaderMap {
        &self.fields
    }

    /// Consume the frame, returning pseudo-headers and fields.
    #[must_use]
    pub fn into_parts(self) -> (Pseudo, HeaderMap) {
        (self.pseudo, self.fields)
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Headers")
            .field("stream_id", &self.stream_id)
            .field("pseudo", &self.pseudo)
            .field("end_stream", &self.end_stream)
            .finish_non_exhaustive()
    }
}

impl Pseudo {
    /// Pseudo-headers for an outbound request.
    #[must_use]
    pub fn request(
        method: Method,
        scheme: impl Into<String>,
        authority: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method: Some(method),
            scheme: Some(scheme.into()),
            authority: Some(authority.into()),
            path: Some(path.into()),
            status: None,
        }
    }

    /// Pseudo-headers for an inbound response.
    #[must_use]
    pub fn response(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// The `:method` pseudo-header, if set.
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// The `:scheme` pseudo-header, if set.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// The `:authority` pseudo-header, if set.
    #[must_use]
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// The `:path` pseudo-header, if set.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// The `:status` pseudo-header, if set.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Whether no pseudo-header is set (a trailers block).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.method.is_none()
            && self.scheme.is_none()
            && self.authority.is_none()
            && self.path.is_none()
            && self.status.is_none()
    }
}

impl fmt::Debug for Pseudo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Skip unset fields to keep frame traces readable.
        let mut builder = f.debug_struct("Pseudo");
        if let Some(method) = &self.method {
            builder.field("method", method);
        }
        if let Some(scheme) = &self.scheme {
            builder.field("scheme", scheme);
        }
        if let Some(authority) = &self.authority {
            builder.field("authority", authority);
        }
        if let Some(path) = &self.path {
            builder.field("path", path);
        }
        if let Some(status) = &self.status {
            builder.field("status", status);
        }
        builder.finish()
    }
}
