//! Immutable snapshot produced by a harvest.

use crate::event_list::{EventList, PayloadView};
use crate::events::{EventKind, TimeStamp};
use crate::thread_data::ThreadIndex;
use serde::Serialize;

/// Sealed bundle of per-thread event lists handed to consumers.
///
/// Ordered by [`ThreadIndex`]; only threads that recorded events during the
/// harvest window appear. Within one thread's list, event order equals the
/// program order of the emits on that thread.
pub struct TraceCollection {
    lists: Vec<(ThreadIndex, Box<EventList>)>,
}

impl TraceCollection {
    pub(crate) fn new(mut lists: Vec<(ThreadIndex, Box<EventList>)>) -> Self {
        lists.sort_by_key(|(index, _)| *index);
        TraceCollection { lists }
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Number of threads that contributed events.
    pub fn thread_count(&self) -> usize {
        self.lists.len()
    }

    /// Total number of events across all threads.
    pub fn event_count(&self) -> usize {
        self.lists.iter().map(|(_, list)| list.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ThreadIndex, &EventList)> {
        self.lists.iter().map(|(index, list)| (*index, &**list))
    }

    pub fn events_for(&self, thread: ThreadIndex) -> Option<&EventList> {
        self.lists
            .iter()
            .find(|(index, _)| *index == thread)
            .map(|(_, list)| &**list)
    }

    /// Flatten the snapshot into consumer-facing records with key names and
    /// payloads resolved, ordered by thread then program order.
    pub fn records(&self) -> Vec<EventRecord> {
        let mut records = Vec::with_capacity(self.event_count());
        for (thread, list) in self.iter() {
            for event in list.iter() {
                records.push(EventRecord {
                    thread,
                    kind: event.kind(),
                    key: event.key().name(),
                    category: event.category().as_u32(),
                    timestamp: event.timestamp(),
                    value: RecordValue::from(list.payload_view(event)),
                });
            }
        }
        records
    }
}

/// Consumer-facing view of one event with key and payload resolved.
///
/// NOTE: the `Serialize` impl here is just for convenience of dumping
/// snapshots to JSON; it is not a wire format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub thread: ThreadIndex,
    pub kind: EventKind,
    pub key: &'static str,
    pub category: u32,
    #[serde(rename = "timestamp_ns")]
    pub timestamp: TimeStamp,
    pub value: RecordValue,
}

/// Owned, serializable payload of an [`EventRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RecordValue {
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Time(TimeStamp),
    Bytes(Vec<u8>),
    Str(String),
}

impl From<PayloadView<'_>> for RecordValue {
    fn from(view: PayloadView<'_>) -> Self {
        match view {
            PayloadView::None => RecordValue::None,
            PayloadView::Bool(v) => RecordValue::Bool(v),
            PayloadView::Int(v) => RecordValue::Int(v),
            PayloadView::UInt(v) => RecordValue::UInt(v),
            PayloadView::Float(v) => RecordValue::Float(v),
            PayloadView::Time(v) => RecordValue::Time(v),
            PayloadView::Bytes(v) => RecordValue::Bytes(v.to_vec()),
            PayloadView::Str(v) => RecordValue::Str(v.to_owned()),
        }
    }
}
