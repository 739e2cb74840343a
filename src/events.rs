//! The trace event data model.
//!
//! An [`Event`] is a fixed-size, trivially copyable record so that per-thread
//! buffers can grow and be handed off without running per-element
//! destructors. Small payload values are stored inline; byte strings are
//! copied into the owning list's arena and referenced by offset (see
//! [`EventList`]).

use crate::event_list::EventList;
use crate::key::KeyToken;
use serde::Serialize;

/// Monotonic tick count, in nanoseconds since the collector was created.
pub type TimeStamp = u64;

/// Small integer tag partitioning events into user-defined groups.
///
/// Categories are opaque to the collector; any value is accepted. `DEFAULT`
/// (0) is reserved for uncategorized events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CategoryId(u32);

impl CategoryId {
    pub const DEFAULT: CategoryId = CategoryId(0);

    pub const fn new(raw: u32) -> Self {
        CategoryId(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Serialize for CategoryId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

/// Classification of a trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    /// Start of an interval; a matching `End` is expected later.
    Begin,
    /// End of an interval opened by a `Begin`.
    End,
    /// A completed interval in one record: `timestamp` is the end tick, the
    /// payload carries the start tick.
    Timespan,
    /// Additive counter change.
    CounterDelta,
    /// Absolute counter sample.
    CounterValue,
    /// Standalone key/value datum.
    Data,
    /// Key/value datum attached to the enclosing scope.
    ScopeData,
    /// A point-in-time marker with no duration.
    Marker,
}

/// Event payload.
///
/// At most one machine word of inline data; `Bytes` and `Str` reference the
/// owning list's arena, whose addresses are stable for the list's lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadValue {
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Start tick of a `Timespan` event.
    Time(TimeStamp),
    /// Raw bytes in the owning list's arena.
    Bytes { offset: u32, len: u32 },
    /// UTF-8 text in the owning list's arena.
    Str { offset: u32, len: u32 },
}

/// One recorded instrumentation record.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    kind: EventKind,
    key: KeyToken,
    category: CategoryId,
    timestamp: TimeStamp,
    payload: PayloadValue,
}

impl Event {
    pub(crate) fn new(
        kind: EventKind,
        key: KeyToken,
        category: CategoryId,
        timestamp: TimeStamp,
        payload: PayloadValue,
    ) -> Self {
        Event {
            kind,
            key,
            category,
            timestamp,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn key(&self) -> KeyToken {
        self.key
    }

    pub fn category(&self) -> CategoryId {
        self.category
    }

    /// For `Timespan` events this is the end tick; the start tick is in the
    /// payload, see [`Event::timespan_start`].
    pub fn timestamp(&self) -> TimeStamp {
        self.timestamp
    }

    pub fn payload(&self) -> PayloadValue {
        self.payload
    }

    /// Start tick of a `Timespan` event, `None` for every other kind.
    pub fn timespan_start(&self) -> Option<TimeStamp> {
        match (self.kind, self.payload) {
            (EventKind::Timespan, PayloadValue::Time(start)) => Some(start),
            _ => None,
        }
    }

    pub(crate) fn rewrite(&mut self, event: Event) {
        *self = event;
    }
}

/// Value types accepted by the data-recording operations.
///
/// Each implementation decides at type-definition time whether the value fits
/// inline in the event (word-sized, trivially copyable) or must be copied
/// into the list's arena.
pub trait TraceData {
    fn to_payload(&self, list: &mut EventList) -> PayloadValue;
}

impl TraceData for bool {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::Bool(*self)
    }
}

impl TraceData for i8 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::Int(i64::from(*self))
    }
}

impl TraceData for i16 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::Int(i64::from(*self))
    }
}

impl TraceData for i32 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::Int(i64::from(*self))
    }
}

impl TraceData for i64 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::Int(*self)
    }
}

impl TraceData for isize {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::Int(*self as i64)
    }
}

impl TraceData for u8 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::UInt(u64::from(*self))
    }
}

impl TraceData for u16 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::UInt(u64::from(*self))
    }
}

impl TraceData for u32 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::UInt(u64::from(*self))
    }
}

impl TraceData for u64 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::UInt(*self)
    }
}

impl TraceData for usize {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::UInt(*self as u64)
    }
}

impl TraceData for f64 {
    fn to_payload(&self, _list: &mut EventList) -> PayloadValue {
        PayloadValue::Float(*self)
    }
}

impl TraceData for str {
    fn to_payload(&self, list: &mut EventList) -> PayloadValue {
        let (offset, len) = list.store_bytes(self.as_bytes());
        PayloadValue::Str { offset, len }
    }
}

impl TraceData for &str {
    fn to_payload(&self, list: &mut EventList) -> PayloadValue {
        (**self).to_payload(list)
    }
}

impl TraceData for String {
    fn to_payload(&self, list: &mut EventList) -> PayloadValue {
        self.as_str().to_payload(list)
    }
}

impl TraceData for [u8] {
    fn to_payload(&self, list: &mut EventList) -> PayloadValue {
        let (offset, len) = list.store_bytes(self);
        PayloadValue::Bytes { offset, len }
    }
}

impl TraceData for &[u8] {
    fn to_payload(&self, list: &mut EventList) -> PayloadValue {
        (**self).to_payload(list)
    }
}

/// Borrowed value for batch data recording, see `TraceCollector::scope_args`.
#[derive(Debug, Clone, Copy)]
pub enum ArgValue<'a> {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl TraceData for ArgValue<'_> {
    fn to_payload(&self, list: &mut EventList) -> PayloadValue {
        match *self {
            ArgValue::Bool(v) => PayloadValue::Bool(v),
            ArgValue::Int(v) => PayloadValue::Int(v),
            ArgValue::UInt(v) => PayloadValue::UInt(v),
            ArgValue::Float(v) => PayloadValue::Float(v),
            ArgValue::Str(v) => v.to_payload(list),
            ArgValue::Bytes(v) => v.to_payload(list),
        }
    }
}

impl From<bool> for ArgValue<'_> {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i8> for ArgValue<'_> {
    fn from(v: i8) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<i16> for ArgValue<'_> {
    fn from(v: i16) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<i32> for ArgValue<'_> {
    fn from(v: i32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<i64> for ArgValue<'_> {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<isize> for ArgValue<'_> {
    fn from(v: isize) -> Self {
        ArgValue::Int(v as i64)
    }
}

impl From<u8> for ArgValue<'_> {
    fn from(v: u8) -> Self {
        ArgValue::UInt(u64::from(v))
    }
}

impl From<u16> for ArgValue<'_> {
    fn from(v: u16) -> Self {
        ArgValue::UInt(u64::from(v))
    }
}

impl From<u32> for ArgValue<'_> {
    fn from(v: u32) -> Self {
        ArgValue::UInt(u64::from(v))
    }
}

impl From<u64> for ArgValue<'_> {
    fn from(v: u64) -> Self {
        ArgValue::UInt(v)
    }
}

impl From<usize> for ArgValue<'_> {
    fn from(v: usize) -> Self {
        ArgValue::UInt(v as u64)
    }
}

impl From<f64> for ArgValue<'_> {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl<'a> From<&'a str> for ArgValue<'a> {
    fn from(v: &'a str) -> Self {
        ArgValue::Str(v)
    }
}

impl<'a> From<&'a [u8]> for ArgValue<'a> {
    fn from(v: &'a [u8]) -> Self {
        ArgValue::Bytes(v)
    }
}
