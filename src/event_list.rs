//! Append-only per-thread event storage.
//!
//! An [`EventList`] owns an ordered sequence of events plus a byte arena for
//! payloads too large to store inline. Both grow in geometrically sized
//! chunks, so appending never moves previously written data: a producer can
//! keep finishing an in-flight append while the harvester takes ownership of
//! the list, and arena offsets handed out by [`EventList::store_bytes`] stay
//! valid for the life of the list.

use crate::events::{Event, PayloadValue, TimeStamp};

/// Capacity of the first event segment; each following segment doubles.
const FIRST_SEGMENT_EVENTS: usize = 256;

/// Capacity of the first arena chunk; each following chunk doubles.
const FIRST_ARENA_CHUNK: usize = 1024;

/// A thread-local, append-only buffer of events plus a payload arena.
///
/// Grows only on the producing thread; sealed (read-only) once swapped out by
/// a harvest, after which consumers may iterate it without synchronization.
pub struct EventList {
    segments: Vec<Vec<Event>>,
    arena: DataArena,
    len: usize,
}

impl Default for EventList {
    fn default() -> Self {
        Self::new()
    }
}

impl EventList {
    pub(crate) fn new() -> Self {
        EventList {
            segments: Vec::new(),
            arena: DataArena::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Amortized O(1); opens a new segment instead of reallocating so that
    /// already-appended events never move.
    pub(crate) fn push(&mut self, event: Event) {
        let needs_segment = match self.segments.last() {
            Some(segment) => segment.len() == segment.capacity(),
            None => true,
        };
        if needs_segment {
            let capacity = self
                .segments
                .last()
                .map_or(FIRST_SEGMENT_EVENTS, |segment| segment.capacity() * 2);
            self.segments.push(Vec::with_capacity(capacity));
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.push(event);
            self.len += 1;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.segments.iter().flatten()
    }

    pub fn last(&self) -> Option<&Event> {
        self.segments.last().and_then(|segment| segment.last())
    }

    pub(crate) fn last_mut(&mut self) -> Option<&mut Event> {
        self.segments
            .last_mut()
            .and_then(|segment| segment.last_mut())
    }

    /// First timestamp in the list, if any.
    pub fn first_timestamp(&self) -> Option<TimeStamp> {
        self.iter().next().map(|event| event.timestamp())
    }

    /// Copy `bytes` into the arena, returning the `(offset, len)` pair to
    /// embed in a payload. The returned region stays valid and unmoved for
    /// the life of the list.
    pub(crate) fn store_bytes(&mut self, bytes: &[u8]) -> (u32, u32) {
        self.arena.store(bytes)
    }

    /// Read back an arena region previously returned by `store_bytes`.
    pub fn bytes_at(&self, offset: u32, len: u32) -> &[u8] {
        self.arena.get(offset, len)
    }

    /// Resolve an event's payload against this list's arena.
    pub fn payload_view(&self, event: &Event) -> PayloadView<'_> {
        match event.payload() {
            PayloadValue::None => PayloadView::None,
            PayloadValue::Bool(v) => PayloadView::Bool(v),
            PayloadValue::Int(v) => PayloadView::Int(v),
            PayloadValue::UInt(v) => PayloadView::UInt(v),
            PayloadValue::Float(v) => PayloadView::Float(v),
            PayloadValue::Time(v) => PayloadView::Time(v),
            PayloadValue::Bytes { offset, len } => PayloadView::Bytes(self.bytes_at(offset, len)),
            PayloadValue::Str { offset, len } => {
                // Stored through `TraceData for str`, so the region is valid
                // UTF-8.
                PayloadView::Str(std::str::from_utf8(self.bytes_at(offset, len)).unwrap_or(""))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn arena_len(&self) -> usize {
        self.arena.len()
    }

    #[cfg(test)]
    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// An event payload with arena references resolved to slices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadView<'a> {
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Time(TimeStamp),
    Bytes(&'a [u8]),
    Str(&'a str),
}

/// Chunked bump allocator for out-of-line payload bytes.
///
/// Chunks never reallocate; a stored region is contiguous within one chunk
/// and addressed by its logical offset (position in the virtual concatenation
/// of chunk contents, with any capacity abandoned at a chunk boundary simply
/// skipped).
struct DataArena {
    chunks: Vec<ArenaChunk>,
}

struct ArenaChunk {
    /// Logical offset of the first byte of this chunk.
    start: usize,
    data: Vec<u8>,
}

impl DataArena {
    fn new() -> Self {
        DataArena { chunks: Vec::new() }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.data.len()).sum()
    }

    fn store(&mut self, bytes: &[u8]) -> (u32, u32) {
        let needs_chunk = match self.chunks.last() {
            Some(chunk) => chunk.data.len() + bytes.len() > chunk.data.capacity(),
            None => true,
        };
        if needs_chunk {
            let capacity = self
                .chunks
                .last()
                .map_or(FIRST_ARENA_CHUNK, |chunk| chunk.data.capacity() * 2)
                .max(bytes.len());
            let start = self
                .chunks
                .last()
                .map_or(0, |chunk| chunk.start + chunk.data.len());
            self.chunks.push(ArenaChunk {
                start,
                data: Vec::with_capacity(capacity),
            });
        }
        match self.chunks.last_mut() {
            Some(chunk) => {
                let offset = chunk.start + chunk.data.len();
                chunk.data.extend_from_slice(bytes);
                (offset as u32, bytes.len() as u32)
            }
            // Unreachable: a chunk with room was just ensured.
            None => (0, 0),
        }
    }

    fn get(&self, offset: u32, len: u32) -> &[u8] {
        let (offset, len) = (offset as usize, len as usize);
        let idx = self.chunks.partition_point(|chunk| chunk.start <= offset);
        let Some(chunk) = idx.checked_sub(1).and_then(|i| self.chunks.get(i)) else {
            return &[];
        };
        let local = offset - chunk.start;
        chunk.data.get(local..local + len).unwrap_or(&[])
    }
}
