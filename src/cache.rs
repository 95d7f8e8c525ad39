// =============================================================================
// Short-TTL keyed cache — authoritative last-known snapshots
// =============================================================================
//
// Keys are `kind:symbol` (e.g. `snapshot:NIFTY`). The interface is deliberately
// narrow so an external backend can be dropped in behind the same trait; the
// in-process backend is a TTL map with opportunistic expiry.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;

use crate::types::Symbol;

/// Narrow cache interface shared by every engine component.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration);
    fn delete(&self, key: &str);
    fn delete_prefix(&self, prefix: &str);
    /// Number of live (unexpired) keys, for diagnostics.
    fn key_count(&self) -> usize;
}

/// Build the canonical `kind:symbol` cache key.
pub fn key(kind: &str, symbol: Symbol) -> String {
    format!("{kind}:{symbol}")
}

/// Purge every cached artifact for a symbol. Called on force-reconnect so a
/// stale snapshot can never outlive the session that produced it.
pub fn purge_symbol(cache: &dyn Cache, symbol: Symbol) {
    for kind in ["snapshot", "outlook", "decision"] {
        cache.delete(&key(kind, symbol));
    }
}

// =============================================================================
// In-memory backend
// =============================================================================

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Process-local TTL map. Expired entries are dropped lazily on read and
/// swept opportunistically on write.
#[derive(Default)]
pub struct InMemoryCache {
    map: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep(map: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        map.retain(|_, entry| entry.expires_at > now);
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let map = self.map.read();
        let entry = map.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(map);
            self.map.write().remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) {
        let mut map = self.map.write();
        // Keep the map from accumulating dead entries between reads.
        if map.len() > 64 {
            Self::sweep(&mut map);
        }
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.map.write().remove(key);
    }

    fn delete_prefix(&self, prefix: &str) {
        self.map.write().retain(|k, _| !k.starts_with(prefix));
    }

    fn key_count(&self) -> usize {
        let now = Instant::now();
        self.map
            .read()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("snapshot:NIFTY", json!({"price": 24500.0}), Duration::from_secs(5));
        let got = cache.get("snapshot:NIFTY").unwrap();
        assert_eq!(got["price"], 24500.0);
    }

    #[test]
    fn expired_entry_is_gone() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("outlook:NIFTY", json!(1), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("outlook:NIFTY").is_none());
        assert_eq!(cache.key_count(), 0);
    }

    #[test]
    fn delete_prefix_clears_symbol_keys() {
        let cache = InMemoryCache::new();
        cache.set_with_ttl("snapshot:NIFTY", json!(1), Duration::from_secs(60));
        cache.set_with_ttl("snapshot:SENSEX", json!(2), Duration::from_secs(60));
        cache.delete_prefix("snapshot:NIFTY");
        assert!(cache.get("snapshot:NIFTY").is_none());
        assert!(cache.get("snapshot:SENSEX").is_some());
    }

    #[test]
    fn purge_symbol_removes_all_kinds() {
        let cache = InMemoryCache::new();
        for kind in ["snapshot", "outlook", "decision"] {
            cache.set_with_ttl(&key(kind, Symbol::Nifty), json!(1), Duration::from_secs(60));
        }
        cache.set_with_ttl(&key("snapshot", Symbol::Sensex), json!(1), Duration::from_secs(60));
        purge_symbol(&cache, Symbol::Nifty);
        assert_eq!(cache.key_count(), 1);
        assert!(cache.get(&key("snapshot", Symbol::Sensex)).is_some());
    }

    #[test]
    fn key_format() {
        assert_eq!(key("decision", Symbol::BankNifty), "decision:BANKNIFTY");
    }
}
