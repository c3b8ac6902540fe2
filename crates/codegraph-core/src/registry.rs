//! Process-wide identity registry (§4.B).
//!
//! A bidirectional table between caller-chosen string keys and opaque
//! pointer identities. Write-once per key, readable from any parse. This is
//! the only piece of shared mutable state in the crate; everything else
//! lives for the duration of one parse/emit pair.
//!
//! The teacher's runtime keeps a thread-local error slot (`error.rs`) for
//! FFI-safe reporting; the registry needs the same "one well-known slot"
//! shape but shared across threads, so it trades `thread_local!` for a
//! `static` `OnceLock<Mutex<..>>`.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// A value's opaque pointer identity, as handed in by callers constructing
/// reference-typed nodes (see `codegraph::value::Value::identity`).
pub type PointerId = usize;

#[derive(Default)]
struct RegistryInner {
    key_to_ptr: HashMap<String, PointerId>,
    ptr_to_key: HashMap<PointerId, String>,
}

fn registry() -> &'static Mutex<RegistryInner> {
    static REGISTRY: OnceLock<Mutex<RegistryInner>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(RegistryInner::default()))
}

/// Error returned by [`register`] when `key` is already bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyRegistered(pub String);

impl std::fmt::Display for AlreadyRegistered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "identity registry key already bound: {}", self.0)
    }
}

impl std::error::Error for AlreadyRegistered {}

/// Bind `key` to `ptr`. Fails if `key` is already bound.
pub fn register(key: impl Into<String>, ptr: PointerId) -> Result<(), AlreadyRegistered> {
    let key = key.into();
    let mut inner = registry().lock().unwrap();
    if inner.key_to_ptr.contains_key(&key) {
        return Err(AlreadyRegistered(key));
    }
    inner.ptr_to_key.insert(ptr, key.clone());
    inner.key_to_ptr.insert(key, ptr);
    Ok(())
}

/// Look up the key a given pointer identity was registered under, if any.
pub fn lookup_by_value(ptr: PointerId) -> Option<String> {
    registry().lock().unwrap().ptr_to_key.get(&ptr).cloned()
}

/// Look up the pointer identity a given key is bound to, if any.
pub fn lookup_by_key(key: &str) -> Option<PointerId> {
    registry().lock().unwrap().key_to_ptr.get(key).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    // tests run concurrently in the same process against one shared
    // registry, so each test needs its own key namespace
    fn unique_key(prefix: &str) -> String {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        format!("{prefix}-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let key = unique_key("test-key");
        register(key.clone(), 0xdead_beef).unwrap();
        assert_eq!(lookup_by_key(&key), Some(0xdead_beef));
        assert_eq!(lookup_by_value(0xdead_beef), Some(key));
    }

    #[test]
    fn duplicate_register_fails() {
        let key = unique_key("dup-key");
        register(key.clone(), 1).unwrap();
        let err = register(key.clone(), 2).unwrap_err();
        assert_eq!(err, AlreadyRegistered(key));
    }
}
