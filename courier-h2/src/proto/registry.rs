use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::frame::StreamId;
use crate::stream::StreamState;

/// Identifies a stream within this transport, independent of its HTTP/2 id.
///
/// A stream gets a token at `new_stream` time and keeps it for life; the
/// HTTP/2 id arrives later, when admission control lets the stream start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Token(u64);

/// The stream table: every live stream by token, started streams by id, and
/// the FIFO queue of streams admitted but waiting for concurrency capacity.
#[derive(Debug)]
pub(crate) struct Registry {
    streams: HashMap<Token, StreamState>,
    by_id: BTreeMap<StreamId, Token>,
    pending: VecDeque<Token>,
    next_token: u64,
    next_stream_id: StreamId,
    ids_exhausted: bool,
    max_concurrent_streams: u32,
}

impl Registry {
    pub(crate) fn new(initial_stream_id: StreamId, max_concurrent_streams: u32) -> Self {
        Self {
            streams: HashMap::new(),
            by_id: BTreeMap::new(),
            pending: VecDeque::new(),
            next_token: 0,
            next_stream_id: initial_stream_id,
            ids_exhausted: false,
            max_concurrent_streams,
        }
    }

    /// Track a freshly created stream. No id is assigned yet.
    pub(crate) fn insert(&mut self, state: StreamState) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.streams.insert(token, state);
        token
    }

    pub(crate) fn contains(&self, token: Token) -> bool {
        self.streams.contains_key(&token)
    }

    pub(crate) fn get_mut(&mut self, token: Token) -> Option<&mut StreamState> {
        self.streams.get_mut(&token)
    }

    pub(crate) fn lookup_id(&self, id: StreamId) -> Option<Token> {
        self.by_id.get(&id).copied()
    }

    /// Remove a stream entirely: table, id index and pending queue.
    /// Removal is idempotent.
    pub(crate) fn remove(&mut self, token: Token) -> Option<StreamState> {
        let state = self.streams.remove(&token)?;
        if let Some(id) = state.id() {
            self.by_id.remove(&id);
        }
        self.pending.retain(|t| *t != token);
        Some(state)
    }

    /// Number of started (id-carrying) streams.
    pub(crate) fn active_len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.by_id.len() < self.max_concurrent_streams as usize
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// No started streams and nothing waiting to start.
    pub(crate) fn is_idle(&self) -> bool {
        self.by_id.is_empty() && self.pending.is_empty()
    }

    pub(crate) fn push_pending(&mut self, token: Token) {
        self.pending.push_back(token);
    }

    /// Pop the next pending stream if capacity allows it to start.
    pub(crate) fn pop_ready(&mut self) -> Option<Token> {
        if self.has_capacity() {
            self.pending.pop_front()
        } else {
            None
        }
    }

    pub(crate) fn max_concurrent_streams(&self) -> u32 {
        self.max_concurrent_streams
    }

    pub(crate) fn set_max_concurrent_streams(&mut self, max: u32) {
        self.max_concurrent_streams = max;
    }

    /// Whether the id space is spent; the next start attempt must instead
    /// drive the transport into go-away.
    pub(crate) fn ids_exhausted(&self) -> bool {
        self.ids_exhausted
    }

    /// Allocate the next odd stream id for `token` and index the stream
    /// under it.
    ///
    /// Ids are handed out strictly increasing. When the allocation reaches
    /// the end of the id space, `next_stream_id` is driven to its sentinel
    /// maximum and [`ids_exhausted`](Self::ids_exhausted) turns true.
    pub(crate) fn assign_id(&mut self, token: Token) -> Option<StreamId> {
        debug_assert!(!self.ids_exhausted, "assign_id after exhaustion");
        let id = self.next_stream_id;
        let state = self.streams.get_mut(&token)?;
        state.set_id(id);
        self.by_id.insert(id, token);

        if id.value() >= StreamId::MAX.value() - 2 {
            self.next_stream_id = StreamId::MAX;
            self.ids_exhausted = true;
        } else {
            match id.next_id() {
                Ok(next) => self.next_stream_id = next,
                Err(_) => {
                    self.next_stream_id = StreamId::MAX;
                    self.ids_exhausted = true;
                }
            }
        }
        Some(id)
    }

    /// Whether a frame for an unknown stream id may refer to a stream this
    /// transport created and has since forgotten.
    pub(crate) fn may_have_created(&self, id: StreamId) -> bool {
        id.is_client_initiated() && id < self.next_stream_id
    }

    /// Remove every started stream with id above `last_known`, in id order.
    pub(crate) fn sweep_above(&mut self, last_known: StreamId) -> Vec<StreamState> {
        let doomed: Vec<Token> = self
            .by_id
            .range(..)
            .filter(|(id, _)| **id > last_known)
            .map(|(_, token)| *token)
            .collect();
        doomed
            .into_iter()
            .filter_map(|token| self.remove(token))
            .collect()
    }

    /// Remove and return every pending stream, in FIFO order.
    pub(crate) fn take_pending(&mut self) -> Vec<StreamState> {
        let pending: Vec<Token> = self.pending.drain(..).collect();
        pending
            .into_iter()
            .filter_map(|token| self.streams.remove(&token))
            .collect()
    }

    /// Every started stream, in id order.
    pub(crate) fn active_tokens(&self) -> Vec<Token> {
        self.by_id.values().copied().collect()
    }

    /// Started streams that still hold flow-blocked data, in id order.
    pub(crate) fn tokens_with_queued_data(&self) -> Vec<Token> {
        self.by_id
            .values()
            .copied()
            .filter(|token| {
                self.streams
                    .get(token)
                    .is_some_and(|state| state.send.has_queued())
            })
            .collect()
    }
}
