//! Per-producer-thread slot.
//!
//! Each thread that records events owns exactly one [`PerThreadData`],
//! created lazily on its first emit and registered in the collector's
//! registry. The slot holds the thread's current [`EventList`] behind an
//! atomic pointer plus the `writing` flag the harvester handshakes on.
//!
//! Discipline: exactly one thread (the owner) calls the append methods on a
//! slot, and exactly one harvester at a time calls [`PerThreadData::take_list`]
//! or [`PerThreadData::clear`]. The owner never blocks; the harvester spins
//! for at most the duration of one in-flight append.

use crate::event_list::EventList;
use crate::events::{CategoryId, Event, EventKind, PayloadValue, TimeStamp, TraceData};
use crate::key::{DynamicKey, KeyToken};
use serde::Serialize;
use smallvec::SmallVec;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// Small integer identifying a producer thread, assigned once at
/// registration and stable for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadIndex(u32);

impl ThreadIndex {
    pub(crate) const fn new(raw: u32) -> Self {
        ThreadIndex(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl Serialize for ThreadIndex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

/// One producer's slot.
pub struct PerThreadData {
    thread_index: ThreadIndex,
    /// True while the owner is inside an append.
    writing: AtomicBool,
    /// The current buffer. Swapped by the harvester, dereferenced mutably by
    /// the owner under the append protocol.
    events: AtomicPtr<EventList>,
    /// Stack of open script-runtime scopes; touched only by the owner thread.
    script_scopes: UnsafeCell<SmallVec<[DynamicKey; 8]>>,
}

// SAFETY: all cross-thread state (`writing`, `events`) is atomic with the
// orderings of the append/harvest protocol; `script_scopes` is only ever
// accessed from the owning thread.
unsafe impl Sync for PerThreadData {}

impl PerThreadData {
    pub(crate) fn new(thread_index: ThreadIndex) -> Self {
        PerThreadData {
            thread_index,
            writing: AtomicBool::new(false),
            events: AtomicPtr::new(Box::into_raw(Box::new(EventList::new()))),
            script_scopes: UnsafeCell::new(SmallVec::new()),
        }
    }

    pub fn thread_index(&self) -> ThreadIndex {
        self.thread_index
    }

    /// Run `f` against the current list under the append protocol: raise
    /// `writing` (release), acquire-load the list, append, lower `writing`
    /// (release). Owner thread only.
    fn with_list<R>(&self, f: impl FnOnce(&mut EventList) -> R) -> R {
        let _writing = WritingGuard::raise(&self.writing);
        let list = self.events.load(Ordering::Acquire);
        // SAFETY: only the owning thread forms a mutable reference, and the
        // harvester does not read or free a swapped-out list until it has
        // observed `writing == false` after its swap, so the list cannot be
        // touched concurrently.
        let list = unsafe { &mut *list };
        f(list)
    }

    pub(crate) fn emplace(
        &self,
        kind: EventKind,
        key: KeyToken,
        category: CategoryId,
        timestamp: TimeStamp,
        payload: PayloadValue,
    ) {
        self.with_list(|list| list.push(Event::new(kind, key, category, timestamp, payload)));
    }

    pub(crate) fn begin_scope(&self, key: KeyToken, category: CategoryId, now: TimeStamp) {
        self.emplace(EventKind::Begin, key, category, now, PayloadValue::None);
    }

    /// Close a scope. When the matching `Begin` is still the last record in
    /// the list, the pair is fused into a single `Timespan` event; otherwise
    /// a loose `End` is appended and left for analysis to pair up.
    pub(crate) fn end_scope(&self, key: KeyToken, category: CategoryId, now: TimeStamp) {
        self.with_list(|list| match list.last_mut() {
            Some(prev)
                if prev.kind() == EventKind::Begin
                    && prev.key() == key
                    && prev.category() == category =>
            {
                let start = prev.timestamp();
                prev.rewrite(Event::new(
                    EventKind::Timespan,
                    key,
                    category,
                    now,
                    PayloadValue::Time(start),
                ));
            }
            _ => list.push(Event::new(
                EventKind::End,
                key,
                category,
                now,
                PayloadValue::None,
            )),
        });
    }

    /// Append one data event, copying the value into the arena when it does
    /// not fit inline.
    pub(crate) fn store_data<T: TraceData + ?Sized>(
        &self,
        kind: EventKind,
        key: KeyToken,
        category: CategoryId,
        timestamp: TimeStamp,
        value: &T,
    ) {
        self.with_list(|list| {
            let payload = value.to_payload(list);
            list.push(Event::new(kind, key, category, timestamp, payload));
        });
    }

    /// Push an open script scope. Owner thread only.
    pub(crate) fn push_script_scope(&self, key: DynamicKey) {
        // SAFETY: the stack is only touched by the owning thread.
        unsafe { (*self.script_scopes.get()).push(key) };
    }

    /// Pop the innermost script scope; `None` when the stack is already
    /// empty (imbalanced pops are tolerated). Owner thread only.
    pub(crate) fn pop_script_scope(&self) -> Option<DynamicKey> {
        // SAFETY: the stack is only touched by the owning thread.
        unsafe { (*self.script_scopes.get()).pop() }
    }

    /// Swap in a fresh list and return the previous one, waiting out any
    /// in-flight append. Harvester side; callable from any thread,
    /// concurrently with owner appends.
    pub(crate) fn take_list(&self) -> Box<EventList> {
        let fresh = Box::into_raw(Box::new(EventList::new()));
        let old = self.events.swap(fresh, Ordering::AcqRel);
        // An appender that loaded the old pointer before the swap may still
        // be writing into it. Once `writing` reads false, that append has
        // finished, and any later append re-loads the pointer and lands in
        // the fresh list, so the old one is quiescent.
        while self.writing.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
        // SAFETY: `old` originates from `Box::into_raw` (at construction or a
        // prior swap), the swap above removed it from the slot, and the spin
        // wait above means no other reference to it remains.
        unsafe { Box::from_raw(old) }
    }

    /// Discard pending events. The next append lands in an empty list.
    pub(crate) fn clear(&self) {
        drop(self.take_list());
    }
}

impl Drop for PerThreadData {
    fn drop(&mut self) {
        let list = *self.events.get_mut();
        if !list.is_null() {
            // SAFETY: `&mut self` gives exclusive access; the pointer
            // originates from `Box::into_raw`.
            drop(unsafe { Box::from_raw(list) });
        }
    }
}

/// RAII for the `writing` handshake flag: raised with release on entry,
/// lowered with release when the append completes.
struct WritingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> WritingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        WritingGuard { flag }
    }
}

impl Drop for WritingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
