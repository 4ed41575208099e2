//! Attached streams keyed by stable id

use std::collections::BTreeMap;

use crate::stream::{MediaSource, Stream, StreamId};

#[derive(Default)]
pub struct StreamRegistry {
    streams: BTreeMap<StreamId, Stream>,
    next_id: u64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the stream wrapping the element identified by `key`
    pub fn find_by_key(&self, key: u64) -> Option<StreamId> {
        self.streams
            .values()
            .find(|stream| stream.source_key() == key)
            .map(Stream::id)
    }

    /// Register a new stream for `source` and return its id
    pub fn insert(&mut self, source: Box<dyn MediaSource>) -> StreamId {
        self.next_id += 1;
        let id = StreamId(self.next_id);
        self.streams.insert(id, Stream::new(id, source));
        id
    }

    pub fn remove(&mut self, id: StreamId) -> Option<Stream> {
        self.streams.remove(&id)
    }

    pub fn get(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn get_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stream> {
        self.streams.values_mut()
    }

    /// Run `f` on every stream
    pub fn broadcast(&mut self, mut f: impl FnMut(&mut Stream)) {
        for stream in self.streams.values_mut() {
            f(stream);
        }
    }

    pub fn ids(&self) -> Vec<StreamId> {
        self.streams.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
