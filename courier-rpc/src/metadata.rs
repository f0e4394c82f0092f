use std::fmt;

use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Reserved metadata key carrying a per-call authority override.
///
/// The transport strips this entry from request metadata and applies it to
/// the HTTP/2 `:authority` pseudo-header instead of sending it as a regular
/// header.
pub const AUTHORITY_OVERRIDE_KEY: &str = "courier-authority-override";

/// Trailer carrying the wire status code of a call.
pub const GRPC_STATUS_HEADER: &str = "grpc-status";

/// Trailer carrying the status message of a call.
pub const GRPC_MESSAGE_HEADER: &str = "grpc-message";

/// Content type sent with every request.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Value of the `te` header required by the protocol.
pub const TE_TRAILERS: &str = "trailers";

/// ASCII metadata attached to a request or response.
///
/// A thin, ordered key/value map over [`http::HeaderMap`]; every entry is
/// carried verbatim as an HTTP/2 header, subject to HPACK encoding by the
/// frame codec.
#[derive(Clone, Default, PartialEq)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create an empty `Metadata` map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
        }
    }

    /// Insert a key/value pair, replacing any previous value for the key.
    pub fn insert(&mut self, key: HeaderName, value: HeaderValue) -> Option<HeaderValue> {
        self.headers.insert(key, value)
    }

    /// Append a key/value pair without removing previous values for the key.
    pub fn append(&mut self, key: HeaderName, value: HeaderValue) {
        self.headers.append(key, value);
    }

    /// Get the first value associated with the key, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.headers.get(key)
    }

    /// Remove the key, returning its first value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.headers.remove(key)
    }

    /// Whether the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Number of entries in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Iterate over all entries in insertion order.
    pub fn iter(&self) -> http::header::Iter<'_, HeaderValue> {
        self.headers.iter()
    }

    /// View the underlying header map.
    #[must_use]
    pub fn as_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume the map, yielding the underlying headers.
    #[must_use]
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Remove and return the authority override entry, decoded as a string.
    ///
    /// Entries whose value is not valid visible ASCII are dropped.
    pub fn take_authority_override(&mut self) -> Option<String> {
        let value = self.remove(AUTHORITY_OVERRIDE_KEY)?;
        value.to_str().ok().map(str::to_owned)
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.headers.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_override_is_stripped() {
        let mut metadata = Metadata::new();
        metadata.insert(
            HeaderName::from_static(AUTHORITY_OVERRIDE_KEY),
            HeaderValue::from_static("override.example.com"),
        );
        metadata.insert(
            HeaderName::from_static("x-custom"),
            HeaderValue::from_static("kept"),
        );

        let authority = metadata.take_authority_override();
        assert_eq!(authority.as_deref(), Some("override.example.com"));
        assert!(metadata.get(AUTHORITY_OVERRIDE_KEY).is_none());
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn take_authority_override_absent() {
        let mut metadata = Metadata::new();
        assert_eq!(metadata.take_authority_override(), None);
    }
}
