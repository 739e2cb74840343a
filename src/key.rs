//! Trace keys and the process-wide intern table.
//!
//! Every event carries a 64-bit [`KeyToken`] identifying its label string.
//! Static keys resolve to the address of their descriptor and cost nothing on
//! the hot path; dynamic keys are interned once into a process-wide table and
//! reuse the cached token afterwards. The two handle spaces are kept disjoint
//! by tagging dynamic tokens with the low bit (descriptor addresses are at
//! least word-aligned, so their low bit is always 0).

use dashmap::DashMap;
use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable 64-bit identity of a trace key.
///
/// Equal key strings map to equal tokens, and a token is never reused for the
/// life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyToken(u64);

impl KeyToken {
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// True for tokens minted by the intern table, false for static
    /// descriptor addresses.
    pub const fn is_dynamic(self) -> bool {
        self.0 & 1 == 1
    }

    fn from_static(key: &'static StaticKey) -> Self {
        KeyToken(key as *const StaticKey as u64)
    }

    const fn from_intern_id(id: u64) -> Self {
        KeyToken((id << 1) | 1)
    }

    /// Resolve the token back to the key string it was created from.
    pub fn name(self) -> &'static str {
        if self.is_dynamic() {
            interner().name_of(self).unwrap_or("<unknown>")
        } else {
            // SAFETY: even tokens are only ever minted from
            // `&'static StaticKey` references, whose address stays valid for
            // the life of the process.
            unsafe { &*(self.0 as *const StaticKey) }.name
        }
    }
}

impl Serialize for KeyToken {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

/// Descriptor for a key known at compile time.
///
/// The descriptor's address is its identity, so instances must live in
/// statics:
///
/// ```
/// use dial9_trace::StaticKey;
///
/// static UPDATE: StaticKey = StaticKey::new("update");
/// ```
#[derive(Debug)]
pub struct StaticKey {
    name: &'static str,
}

impl StaticKey {
    pub const fn new(name: &'static str) -> Self {
        StaticKey { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn token(&'static self) -> KeyToken {
        KeyToken::from_static(self)
    }
}

/// A key created from a runtime string.
///
/// The name is interned on construction and the token cached, so recording
/// repeatedly with the same `DynamicKey` does no further table lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicKey {
    token: KeyToken,
    name: &'static str,
}

impl DynamicKey {
    pub fn new(name: &str) -> Self {
        let (token, name) = interner().intern(name);
        DynamicKey { token, name }
    }

    pub fn token(&self) -> KeyToken {
        self.token
    }

    pub fn name(&self) -> &str {
        self.name
    }
}

impl From<&str> for DynamicKey {
    fn from(name: &str) -> Self {
        DynamicKey::new(name)
    }
}

impl From<&String> for DynamicKey {
    fn from(name: &String) -> Self {
        DynamicKey::new(name)
    }
}

/// Either flavor of key, borrowed at a record call site.
///
/// Implemented for `&'static StaticKey` and `&DynamicKey`, mirroring the
/// static/dynamic pairs of the recording operations.
pub trait TraceKeyRef {
    fn token(&self) -> KeyToken;
}

impl TraceKeyRef for &'static StaticKey {
    fn token(&self) -> KeyToken {
        KeyToken::from_static(*self)
    }
}

impl TraceKeyRef for &DynamicKey {
    fn token(&self) -> KeyToken {
        DynamicKey::token(*self)
    }
}

/// Process-wide intern table: UTF-8 names to stable dynamic tokens, both
/// directions. Interned names are leaked so lookups can hand out `'static`
/// references without cloning.
struct Interner {
    by_name: DashMap<&'static str, KeyToken>,
    by_token: DashMap<u64, &'static str>,
    next_id: AtomicU64,
}

impl Interner {
    fn new() -> Self {
        Interner {
            by_name: DashMap::new(),
            by_token: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn intern(&self, name: &str) -> (KeyToken, &'static str) {
        if let Some(entry) = self.by_name.get(name) {
            return (*entry.value(), *entry.key());
        }
        // Losing an insert race below wastes this one copy of the name; the
        // table itself stays consistent because the entry API decides the
        // winner.
        let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let entry = self.by_name.entry(leaked).or_insert_with(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let token = KeyToken::from_intern_id(id);
            self.by_token.insert(token.as_u64(), leaked);
            token
        });
        (*entry.value(), *entry.key())
    }

    fn name_of(&self, token: KeyToken) -> Option<&'static str> {
        self.by_token.get(&token.as_u64()).map(|entry| *entry.value())
    }
}

fn interner() -> &'static Interner {
    static INTERNER: OnceLock<Interner> = OnceLock::new();
    INTERNER.get_or_init(Interner::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    static ALPHA: StaticKey = StaticKey::new("alpha");
    static BETA: StaticKey = StaticKey::new("beta");

    #[test]
    fn test_static_tokens_are_even_and_stable() {
        let t1 = ALPHA.token();
        let t2 = ALPHA.token();
        assert_eq!(t1, t2);
        assert!(!t1.is_dynamic());
        assert_eq!(t1.as_u64() & 1, 0);
        assert_ne!(ALPHA.token(), BETA.token());
        assert_eq!(t1.name(), "alpha");
    }

    #[test]
    fn test_dynamic_interning_identity() {
        let a1 = DynamicKey::new("render/update");
        let a2 = DynamicKey::new("render/update");
        let b = DynamicKey::new("render/draw");
        assert_eq!(a1.token(), a2.token());
        assert!(a1.token().is_dynamic());
        assert_ne!(a1.token(), b.token());
        assert_eq!(a1.token().name(), "render/update");
        assert_eq!(b.token().name(), "render/draw");
    }

    #[test]
    fn test_static_and_dynamic_namespaces_disjoint() {
        // Same spelling, different flavor: the handles must differ, yet both
        // resolve to the name.
        let dynamic = DynamicKey::new("alpha");
        assert_ne!(dynamic.token(), ALPHA.token());
        assert_eq!(dynamic.token().name(), "alpha");
        assert_eq!(ALPHA.token().name(), "alpha");
    }

    #[test]
    fn test_concurrent_interning_agrees() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..100)
                        .map(|i| DynamicKey::new(&format!("contended_{}", i % 10)).token())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<KeyToken>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for tokens in &results[1..] {
            assert_eq!(tokens, &results[0]);
        }
    }

    #[test]
    fn test_key_ref_trait() {
        fn token_of<K: TraceKeyRef>(key: K) -> KeyToken {
            key.token()
        }
        assert_eq!(token_of(&ALPHA), ALPHA.token());
        let key = DynamicKey::new("via-trait");
        assert_eq!(token_of(&key), key.token());
    }
}
