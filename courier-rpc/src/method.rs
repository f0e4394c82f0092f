use std::fmt;

/// The cardinality of an RPC method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// One request message, one response message.
    Unary,
    /// A stream of request messages, one response message.
    ClientStreaming,
    /// One request message, a stream of response messages.
    ServerStreaming,
    /// Streams in both directions.
    BidiStreaming,
}

impl MethodKind {
    /// Whether the client sends at most one message for this kind of call.
    ///
    /// When it does, request HEADERS need not be flushed eagerly; they can
    /// ride the same flush as the single DATA frame that follows.
    #[must_use]
    pub fn client_sends_one_message(&self) -> bool {
        matches!(self, Self::Unary | Self::ServerStreaming)
    }
}

/// Describes one remote procedure: its fully qualified name and cardinality.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    full_name: String,
    kind: MethodKind,
}

impl MethodDescriptor {
    /// Create a descriptor from a fully qualified method name such as
    /// `package.Service/Method`.
    pub fn new(full_name: impl Into<String>, kind: MethodKind) -> Self {
        Self {
            full_name: full_name.into(),
            kind,
        }
    }

    /// The fully qualified method name, without a leading slash.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The cardinality of the method.
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// The `:path` pseudo-header value for this method.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}", self.full_name)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("full_name", &self.full_name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_has_leading_slash() {
        let method = MethodDescriptor::new("pkg.Service/Call", MethodKind::Unary);
        assert_eq!(method.path(), "/pkg.Service/Call");
    }

    #[test]
    fn one_message_kinds() {
        assert!(MethodKind::Unary.client_sends_one_message());
        assert!(MethodKind::ServerStreaming.client_sends_one_message());
        assert!(!MethodKind::ClientStreaming.client_sends_one_message());
        assert!(!MethodKind::BidiStreaming.client_sends_one_message());
    }
}
