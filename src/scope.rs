//! RAII scope recording.

use crate::collector::TraceCollector;
use crate::events::{CategoryId, TimeStamp};
use crate::key::StaticKey;

/// Guard that records its lexical scope as a single `Timespan` event.
///
/// The start tick is captured at construction and the event is emitted on
/// drop, so an instrumented scope costs two clock reads and one append, and
/// nothing at all when collection is off when the scope is entered.
///
/// ```
/// use dial9_trace::{CategoryId, StaticKey, TraceScope};
///
/// static LOAD: StaticKey = StaticKey::new("load");
///
/// fn load() {
///     let _scope = TraceScope::new(&LOAD, CategoryId::DEFAULT);
///     // ... work ...
/// }
/// ```
#[must_use = "the scope is recorded when the guard is dropped"]
pub struct TraceScope {
    key: &'static StaticKey,
    category: CategoryId,
    /// 0 means collection was off when the scope was entered.
    start: TimeStamp,
}

impl TraceScope {
    pub fn new(key: &'static StaticKey, category: CategoryId) -> Self {
        let collector = TraceCollector::instance();
        let start = if collector.is_enabled() {
            collector.now()
        } else {
            0
        };
        TraceScope {
            key,
            category,
            start,
        }
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        if self.start != 0 {
            TraceCollector::instance().scope(self.key, self.start, self.category);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_support;
    use crate::events::EventKind;

    static GUARDED: StaticKey = StaticKey::new("guarded");

    #[test]
    fn test_guard_records_one_timespan() {
        let _gate = test_support::lock();
        let collector = TraceCollector::instance();
        collector.set_enabled(false);
        collector.clear();
        collector.set_enabled(true);

        {
            let _scope = TraceScope::new(&GUARDED, CategoryId::new(9));
        }

        collector.set_enabled(false);
        let collection = collector.create_collection();
        assert_eq!(collection.event_count(), 1);
        let (_, list) = collection.iter().next().unwrap();
        let event = list.iter().next().unwrap();
        assert_eq!(event.kind(), EventKind::Timespan);
        assert_eq!(event.key(), GUARDED.token());
        assert_eq!(event.category(), CategoryId::new(9));
        assert!(event.timestamp() >= event.timespan_start().unwrap());
    }

    #[test]
    fn test_guard_entered_while_disabled_records_nothing() {
        let _gate = test_support::lock();
        let collector = TraceCollector::instance();
        collector.set_enabled(false);
        collector.clear();

        let scope = TraceScope::new(&GUARDED, CategoryId::DEFAULT);
        // Enabling after entry must not produce a bogus half-measured span.
        collector.set_enabled(true);
        drop(scope);

        collector.set_enabled(false);
        assert!(collector.create_collection().is_empty());
    }
}
