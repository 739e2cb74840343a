//! Lock-free registry of producer slots.
//!
//! An append-only singly-linked list: any thread may push a new slot with a
//! head CAS on its first emit, while a harvester walks the list concurrently.
//! Nodes are intentionally leaked, so a slot's address stays valid for
//! registry iteration for the life of the process.

use crate::thread_data::{PerThreadData, ThreadIndex};
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

struct Node {
    data: PerThreadData,
    next: AtomicPtr<Node>,
}

pub(crate) struct ThreadRegistry {
    head: AtomicPtr<Node>,
    next_index: AtomicU32,
}

impl ThreadRegistry {
    pub(crate) const fn new() -> Self {
        ThreadRegistry {
            head: AtomicPtr::new(ptr::null_mut()),
            next_index: AtomicU32::new(0),
        }
    }

    /// Allocate a slot for the calling thread and publish it at the head of
    /// the list. Lock-free; safe to call from any number of threads at once.
    pub(crate) fn register(&self) -> &'static PerThreadData {
        let index = ThreadIndex::new(self.next_index.fetch_add(1, Ordering::Relaxed));
        let node = Box::into_raw(Box::new(Node {
            data: PerThreadData::new(index),
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `node` is not yet published; no other thread can see it.
            unsafe { (*node).next.store(head, Ordering::Relaxed) };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }
        // SAFETY: nodes are never freed or moved, so the reference is valid
        // for the rest of the process.
        unsafe { &(*node).data }
    }

    /// Walk every slot published at or before the acquire-load of the head.
    /// Slots registered while the walk is in progress may or may not be
    /// observed; a brand-new slot holds no events yet, so either outcome is
    /// fine for a harvest.
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.load(Ordering::Acquire),
            _registry: PhantomData,
        }
    }
}

pub(crate) struct Iter<'a> {
    next: *mut Node,
    _registry: PhantomData<&'a ThreadRegistry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a PerThreadData;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        // SAFETY: published nodes are never freed or moved.
        let node = unsafe { &*self.next };
        self.next = node.next.load(Ordering::Acquire);
        Some(&node.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_empty_registry_iterates_nothing() {
        let registry = ThreadRegistry::new();
        assert_eq!(registry.iter().count(), 0);
    }

    #[test]
    fn test_register_assigns_unique_indices() {
        let registry = ThreadRegistry::new();
        let a = registry.register();
        let b = registry.register();
        let c = registry.register();
        let indices: HashSet<u32> = [a, b, c]
            .iter()
            .map(|slot| slot.thread_index().as_u32())
            .collect();
        assert_eq!(indices.len(), 3);
        assert_eq!(registry.iter().count(), 3);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(ThreadRegistry::new());
        const THREADS: usize = 16;
        const PER_THREAD: usize = 32;

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        registry.register();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let indices: Vec<u32> = registry
            .iter()
            .map(|slot| slot.thread_index().as_u32())
            .collect();
        assert_eq!(indices.len(), THREADS * PER_THREAD);
        let unique: HashSet<u32> = indices.iter().copied().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);
    }

    #[test]
    fn test_iteration_concurrent_with_registration() {
        let registry = Arc::new(ThreadRegistry::new());
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut registered = 0usize;
                while !stop.load(Ordering::Acquire) {
                    registry.register();
                    registered += 1;
                }
                registered
            })
        };

        // Counts observed by concurrent walks only ever grow.
        let mut last = 0usize;
        for _ in 0..1000 {
            let count = registry.iter().count();
            assert!(count >= last);
            last = count;
        }

        stop.store(true, Ordering::Release);
        let registered = writer.join().unwrap();
        assert_eq!(registry.iter().count(), registered);
    }
}
