//! Auto-tracing hook for an embedded script runtime.
//!
//! The collector does not know anything about the runtime it instruments; an
//! adapter implements [`ScriptRuntime`] to splice a tracing callback into the
//! interpreter and forwards the callback's call/return/exception
//! notifications to `TraceCollector::script_call`,
//! `TraceCollector::script_return` and `TraceCollector::script_exception`.
//! The collector installs and removes the hook as tracing toggles, and keeps
//! the per-thread stack of open script scopes so that popping stays tolerant
//! of imbalanced notifications.

/// Interface the collector uses to (un)hook an embedded script runtime.
///
/// `install_tracing_hook` is invoked when both the collector and script
/// tracing are enabled; `remove_tracing_hook` when either is switched off.
/// Both may be called redundantly and must be idempotent.
pub trait ScriptRuntime: Send + Sync {
    fn install_tracing_hook(&self);
    fn remove_tracing_hook(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::test_support;
    use crate::collector::TraceCollector;
    use crate::events::{CategoryId, EventKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeRuntime {
        installed: AtomicBool,
    }

    impl ScriptRuntime for FakeRuntime {
        fn install_tracing_hook(&self) {
            self.installed.store(true, Ordering::Release);
        }

        fn remove_tracing_hook(&self) {
            self.installed.store(false, Ordering::Release);
        }
    }

    #[test]
    fn test_hook_follows_enable_state() {
        let _gate = test_support::lock();
        let collector = TraceCollector::instance();
        let runtime = Arc::new(FakeRuntime {
            installed: AtomicBool::new(false),
        });
        collector.set_script_runtime(runtime.clone());

        collector.set_script_tracing_enabled(true);
        assert!(!runtime.installed.load(Ordering::Acquire));

        collector.set_enabled(true);
        assert!(runtime.installed.load(Ordering::Acquire));

        collector.set_enabled(false);
        assert!(!runtime.installed.load(Ordering::Acquire));

        // Toggling script tracing while the collector runs takes effect
        // immediately.
        collector.set_enabled(true);
        assert!(runtime.installed.load(Ordering::Acquire));
        collector.set_script_tracing_enabled(false);
        assert!(!runtime.installed.load(Ordering::Acquire));

        collector.set_enabled(false);
    }

    #[test]
    fn test_script_scopes_emit_begin_end() {
        let _gate = test_support::lock();
        let collector = TraceCollector::instance();
        collector.set_script_tracing_enabled(true);
        collector.set_enabled(true);

        collector.script_call("outer", CategoryId::DEFAULT);
        collector.script_call("inner", CategoryId::DEFAULT);
        collector.script_return(CategoryId::DEFAULT);
        collector.script_return(CategoryId::DEFAULT);

        collector.set_enabled(false);
        collector.set_script_tracing_enabled(false);
        let collection = collector.create_collection();

        let records = collection.records();
        let script: Vec<(EventKind, &str)> = records
            .iter()
            .filter(|r| r.key == "outer" || r.key == "inner")
            .map(|r| (r.kind, r.key))
            .collect();
        assert_eq!(
            script,
            vec![
                (EventKind::Begin, "outer"),
                (EventKind::Begin, "inner"),
                (EventKind::End, "inner"),
                (EventKind::End, "outer"),
            ]
        );
    }

    #[test]
    fn test_script_imbalance_is_tolerated() {
        let _gate = test_support::lock();
        let collector = TraceCollector::instance();
        collector.set_script_tracing_enabled(true);
        collector.set_enabled(true);

        // Returns without calls must not panic or emit anything.
        collector.script_return(CategoryId::DEFAULT);
        collector.script_exception(CategoryId::DEFAULT);
        collector.script_call("lonely", CategoryId::DEFAULT);
        collector.script_exception(CategoryId::DEFAULT);
        collector.script_return(CategoryId::DEFAULT);

        collector.set_enabled(false);
        collector.set_script_tracing_enabled(false);
        let collection = collector.create_collection();

        let script: Vec<EventKind> = collection
            .records()
            .iter()
            .filter(|r| r.key == "lonely")
            .map(|r| r.kind)
            .collect();
        assert_eq!(script, vec![EventKind::Begin, EventKind::End]);
    }
}
