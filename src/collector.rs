//! The process-wide collector: gate, public recording API, and harvest.

use crate::collection::TraceCollection;
use crate::events::{ArgValue, CategoryId, EventKind, PayloadValue, TimeStamp, TraceData};
use crate::key::{DynamicKey, StaticKey, TraceKeyRef};
use crate::registry::ThreadRegistry;
use crate::script::ScriptRuntime;
use crate::thread_data::PerThreadData;
use arc_swap::ArcSwap;
use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::debug;

/// Callback invoked with every collection produced after registration.
pub type CollectionSubscriber = Arc<dyn Fn(&Arc<TraceCollection>) + Send + Sync>;

thread_local! {
    /// Cached pointer to this thread's slot in the registry. Null until the
    /// first enabled emit from this thread; the slot is leaked, so a cached
    /// pointer never dangles.
    static THREAD_DATA: Cell<*const PerThreadData> = const { Cell::new(ptr::null()) };
}

/// Process-wide trace event collector.
///
/// Application code sprinkles the recording operations across hot paths;
/// while collection is disabled each call is one acquire load and a
/// not-taken branch. While enabled, events go to a per-thread buffer with no
/// inter-thread contention, until [`TraceCollector::create_collection`]
/// swaps the buffers out and bundles them into an immutable snapshot.
///
/// All methods are safe to call from any thread.
pub struct TraceCollector {
    enabled: AtomicBool,
    label: String,
    /// Zero point of every timestamp handed out by [`TraceCollector::now`].
    epoch: Instant,
    registry: ThreadRegistry,
    script_tracing: AtomicBool,
    script_runtime: ArcSwap<Option<Arc<dyn ScriptRuntime>>>,
    subscribers: ArcSwap<Vec<CollectionSubscriber>>,
}

impl TraceCollector {
    /// The process-wide collector, created on first use. Never torn down;
    /// late calls during process exit degrade to no-ops via the gate.
    pub fn instance() -> &'static TraceCollector {
        static INSTANCE: OnceLock<TraceCollector> = OnceLock::new();
        INSTANCE.get_or_init(|| TraceCollector::new("main"))
    }

    fn new(label: &str) -> Self {
        TraceCollector {
            enabled: AtomicBool::new(false),
            label: label.to_owned(),
            epoch: Instant::now(),
            registry: ThreadRegistry::new(),
            script_tracing: AtomicBool::new(false),
            script_runtime: ArcSwap::from_pointee(None),
            subscribers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Label identifying this collector instance.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Nanoseconds since the collector was created. Monotonic within a
    /// thread; approximately monotonic across threads.
    #[inline]
    pub fn now(&self) -> TimeStamp {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn ms_to_timestamp(ms: f64) -> TimeStamp {
        (ms * 1_000_000.0) as TimeStamp
    }

    /// Whether collection of events is enabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable collection of events.
    ///
    /// Turning collection on drops anything left over from a previous window
    /// (a stale unmatched `Begin` must not leak into the next collection) and
    /// hooks the script runtime if requested; both happen before the gate
    /// becomes visible to producers. Turning it off removes the hook.
    pub fn set_enabled(&self, enabled: bool) {
        if self.is_enabled() == enabled {
            return;
        }
        if enabled {
            self.clear_slots();
            if self.is_script_tracing_enabled() {
                self.install_script_hook();
            }
            self.enabled.store(true, Ordering::Release);
            debug!(label = %self.label, "trace collection enabled");
        } else {
            self.enabled.store(false, Ordering::Release);
            self.remove_script_hook();
            debug!(label = %self.label, "trace collection disabled");
        }
    }

    /// Discard all pending events; no collection will be made for them.
    /// Collections already harvested are untouched. Safe to call while
    /// producers are recording.
    pub fn clear(&self) {
        self.clear_slots();
        debug!(label = %self.label, "pending trace events cleared");
    }

    fn clear_slots(&self) {
        for slot in self.registry.iter() {
            slot.clear();
        }
    }

    /// This thread's slot, created and registered on first use.
    fn thread_data(&self) -> &'static PerThreadData {
        THREAD_DATA.with(|cell| {
            let cached = cell.get();
            if !cached.is_null() {
                // SAFETY: slots are leaked; a cached pointer stays valid.
                return unsafe { &*cached };
            }
            let slot = self.registry.register();
            cell.set(slot);
            slot
        })
    }

    /// Record a begin event with `key`. A matching [`TraceCollector::end_event`]
    /// is expected some time in the future.
    ///
    /// When the key is known at compile time, [`TraceCollector::begin_scope`]
    /// and [`TraceCollector::scope`] are preferred: they skip interning.
    /// Returns the event's timestamp, or 0 when the collector is disabled.
    pub fn begin_event(&self, key: &DynamicKey, category: CategoryId) -> TimeStamp {
        if !self.is_enabled() {
            return 0;
        }
        let now = self.now();
        self.thread_data()
            .emplace(EventKind::Begin, key.token(), category, now, PayloadValue::None);
        now
    }

    /// Record an end event with `key`; the counterpart of
    /// [`TraceCollector::begin_event`]. Returns the event's timestamp, or 0
    /// when the collector is disabled.
    pub fn end_event(&self, key: &DynamicKey, category: CategoryId) -> TimeStamp {
        if !self.is_enabled() {
            return 0;
        }
        let now = self.now();
        self.thread_data()
            .emplace(EventKind::End, key.token(), category, now, PayloadValue::None);
        now
    }

    /// Record a begin event at a caller-supplied time in elapsed
    /// milliseconds. Testing and debugging hook.
    pub fn begin_event_at_time(&self, key: &DynamicKey, ms: f64, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        self.thread_data().emplace(
            EventKind::Begin,
            key.token(),
            category,
            Self::ms_to_timestamp(ms),
            PayloadValue::None,
        );
    }

    /// Record an end event at a caller-supplied time in elapsed
    /// milliseconds. Testing and debugging hook.
    pub fn end_event_at_time(&self, key: &DynamicKey, ms: f64, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        self.thread_data().emplace(
            EventKind::End,
            key.token(),
            category,
            Self::ms_to_timestamp(ms),
            PayloadValue::None,
        );
    }

    /// Record a point-in-time marker. Returns the event's timestamp, or 0
    /// when the collector is disabled.
    pub fn marker_event(&self, key: &DynamicKey, category: CategoryId) -> TimeStamp {
        if !self.is_enabled() {
            return 0;
        }
        let now = self.now();
        self.thread_data()
            .emplace(EventKind::Marker, key.token(), category, now, PayloadValue::None);
        now
    }

    /// Record a marker at a caller-supplied time in elapsed milliseconds.
    pub fn marker_event_at_time(&self, key: &DynamicKey, ms: f64, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        self.thread_data().emplace(
            EventKind::Marker,
            key.token(),
            category,
            Self::ms_to_timestamp(ms),
            PayloadValue::None,
        );
    }

    /// Open a scope with a compile-time key. No interning, no allocation.
    #[inline]
    pub fn begin_scope(&self, key: &'static StaticKey, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        let now = self.now();
        self.thread_data().begin_scope(key.token(), category, now);
    }

    /// Close a scope opened by [`TraceCollector::begin_scope`]. Fuses with
    /// the begin into a single `Timespan` event when nothing was recorded in
    /// between; consumers must tolerate either form.
    #[inline]
    pub fn end_scope(&self, key: &'static StaticKey, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        let now = self.now();
        self.thread_data().end_scope(key.token(), category, now);
    }

    /// Record a whole scope in one `Timespan` event: started at `start`,
    /// ending now. This is what RAII scope guards emit on drop.
    #[inline]
    pub fn scope(&self, key: &'static StaticKey, start: TimeStamp, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        let now = self.now();
        self.thread_data().emplace(
            EventKind::Timespan,
            key.token(),
            category,
            now,
            PayloadValue::Time(start),
        );
    }

    /// Record a batch of data events attached to the enclosing scope. More
    /// efficient than repeated [`TraceCollector::store_data`] calls: the gate
    /// and slot are resolved once for the whole batch.
    pub fn scope_args(&self, category: CategoryId, args: &[(&'static StaticKey, ArgValue<'_>)]) {
        if !self.is_enabled() {
            return;
        }
        let now = self.now();
        let data = self.thread_data();
        for (key, value) in args {
            data.store_data(EventKind::ScopeData, key.token(), category, now, value);
        }
    }

    /// Record a single data event. `value` may be any [`TraceData`] type:
    /// bool, integers up to 64 bits, f64, `&str`, `String` or `&[u8]`. Byte
    /// and UTF-8 strings are copied into the thread's buffer arena.
    pub fn store_data<K: TraceKeyRef, T: TraceData>(
        &self,
        key: K,
        value: T,
        category: CategoryId,
    ) {
        if !self.is_enabled() {
            return;
        }
        let now = self.now();
        self.thread_data()
            .store_data(EventKind::Data, key.token(), category, now, &value);
    }

    /// Record an additive counter change for `key`.
    pub fn record_counter_delta<K: TraceKeyRef>(&self, key: K, delta: f64, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        let now = self.now();
        self.thread_data().emplace(
            EventKind::CounterDelta,
            key.token(),
            category,
            now,
            PayloadValue::Float(delta),
        );
    }

    /// Record an absolute counter sample for `key`.
    pub fn record_counter_value<K: TraceKeyRef>(&self, key: K, value: f64, category: CategoryId) {
        if !self.is_enabled() {
            return;
        }
        let now = self.now();
        self.thread_data().emplace(
            EventKind::CounterValue,
            key.token(),
            category,
            now,
            PayloadValue::Float(value),
        );
    }

    /// Harvest every thread's pending events into an immutable snapshot and
    /// notify subscribers.
    ///
    /// Creating a collection restarts tracing: each slot's buffer is swapped
    /// for a fresh one, so events recorded after this returns are guaranteed
    /// not to appear in the returned collection. Only one harvester may run
    /// at a time.
    pub fn create_collection(&self) -> Arc<TraceCollection> {
        let mut lists = Vec::new();
        for slot in self.registry.iter() {
            let list = slot.take_list();
            if !list.is_empty() {
                lists.push((slot.thread_index(), list));
            }
        }
        let collection = Arc::new(TraceCollection::new(lists));
        debug!(
            label = %self.label,
            threads = collection.thread_count(),
            events = collection.event_count(),
            "trace collection created"
        );
        for subscriber in self.subscribers.load().iter() {
            subscriber(&collection);
        }
        collection
    }

    /// Register a callback invoked with every collection produced after this
    /// call.
    pub fn add_collection_subscriber(
        &self,
        subscriber: impl Fn(&Arc<TraceCollection>) + Send + Sync + 'static,
    ) {
        let subscriber: CollectionSubscriber = Arc::new(subscriber);
        self.subscribers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(subscriber.clone());
            next
        });
    }

    /// Whether automatic tracing of script-runtime scopes is requested.
    pub fn is_script_tracing_enabled(&self) -> bool {
        self.script_tracing.load(Ordering::Acquire)
    }

    /// Toggle automatic tracing of script-runtime scopes. Takes effect
    /// immediately when the collector is already enabled, otherwise on the
    /// next [`TraceCollector::set_enabled`].
    pub fn set_script_tracing_enabled(&self, enabled: bool) {
        self.script_tracing.store(enabled, Ordering::Release);
        if self.is_enabled() {
            if enabled {
                self.install_script_hook();
            } else {
                self.remove_script_hook();
            }
        }
    }

    /// Register the external script runtime to hook when script tracing is
    /// enabled.
    pub fn set_script_runtime(&self, runtime: Arc<dyn ScriptRuntime>) {
        self.script_runtime.store(Arc::new(Some(runtime)));
    }

    fn install_script_hook(&self) {
        if let Some(runtime) = &**self.script_runtime.load() {
            runtime.install_tracing_hook();
        }
    }

    fn remove_script_hook(&self) {
        if let Some(runtime) = &**self.script_runtime.load() {
            runtime.remove_tracing_hook();
        }
    }

    /// Script runtime hook entry point: a function was called. Pushes the
    /// scope and records a `Begin`.
    pub fn script_call(&self, name: &str, category: CategoryId) {
        if !self.is_enabled() || !self.is_script_tracing_enabled() {
            return;
        }
        let key = DynamicKey::new(name);
        let now = self.now();
        let data = self.thread_data();
        data.emplace(EventKind::Begin, key.token(), category, now, PayloadValue::None);
        data.push_script_scope(key);
    }

    /// Script runtime hook entry point: a function returned. Pops the
    /// innermost script scope and records its `End`; extra returns are
    /// ignored.
    pub fn script_return(&self, category: CategoryId) {
        if !self.is_enabled() || !self.is_script_tracing_enabled() {
            return;
        }
        let now = self.now();
        let data = self.thread_data();
        if let Some(key) = data.pop_script_scope() {
            data.emplace(EventKind::End, key.token(), category, now, PayloadValue::None);
        }
    }

    /// Script runtime hook entry point: a function unwound with an
    /// exception. Same effect as a return.
    pub fn script_exception(&self, category: CategoryId) {
        self.script_return(category);
    }
}
