//! The TTL cache (spec §3 / §4.4): `domain -> (ip, timestamp)`, guarded by
//! a single reader-writer lock. Unlike the teacher's `lib-dns-resolver`
//! cache (a size-bounded, per-record-type, LRU-evicted `Cache`), this one
//! has no eviction beyond what `get` treats as expired — the spec's
//! invariant is "overwritten on next resolve, opportunistically removed on
//! persist," not bounded memory. The `SharedCache` wrapper and its poison
//! message follow the teacher's shape even though the interior is simpler.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

const MUTEX_POISON_MESSAGE: &str = "cache lock was poisoned by a panicking holder";

/// Default TTL (spec §3: "default 10 min"), grounded on
/// `dnsmasq.NewCacheWithTTL(10 * time.Minute)` in the source this spec was
/// distilled from.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// A single cache entry. `ip` is named for what it holds in the common
/// case, but per spec §9's open question, step 4 of the resolver (CNAME
/// chase) stores a CNAME target string under this same field for the
/// `current` key. This workspace preserves that conflation rather than
/// splitting into separate address/alias maps — see DESIGN.md.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub ip: String,
    pub timestamp: Instant,
}

/// Shape of a single entry as it appears in the on-disk JSON cache file
/// (spec §6): `{"ip": "<string>", "timestamp": "<RFC3339>"}`. Kept distinct
/// from [`CacheEntry`] because `Instant` has no wall-clock representation;
/// the cache store module converts between the two at load/save time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub ip: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

struct Cache {
    entries: HashMap<String, CacheEntry>,
}

/// Thread-safe handle to the TTL cache, cloneable and cheap to share across
/// the listener's per-query tasks.
#[derive(Clone)]
pub struct SharedCache {
    cache: std::sync::Arc<RwLock<Cache>>,
    ttl: Duration,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: std::sync::Arc::new(RwLock::new(Cache {
                entries: HashMap::new(),
            })),
            ttl,
        }
    }

    /// Returns a value iff an entry exists and is no older than the TTL
    /// (spec §4.4, testable property 5). Expired entries are left in place
    /// — they are not eagerly deleted, only treated as absent.
    pub fn get(&self, domain: &str) -> Option<String> {
        let cache = self.cache.read().expect(MUTEX_POISON_MESSAGE);
        let entry = cache.entries.get(domain)?;
        if entry.timestamp.elapsed() <= self.ttl {
            Some(entry.ip.clone())
        } else {
            None
        }
    }

    /// Unconditionally overwrites the entry for `domain` with a fresh
    /// timestamp.
    pub fn set(&self, domain: &str, value: &str) {
        let mut cache = self.cache.write().expect(MUTEX_POISON_MESSAGE);
        cache.entries.insert(
            domain.to_string(),
            CacheEntry {
                ip: value.to_string(),
                timestamp: Instant::now(),
            },
        );
    }

    /// Point-in-time copy of the underlying map, taken under the read
    /// lock. Subsequent `set` calls do not mutate the returned map
    /// (testable property 6).
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        let cache = self.cache.read().expect(MUTEX_POISON_MESSAGE);
        cache.entries.clone()
    }

    /// Replace the whole map, e.g. when loading a persisted snapshot at
    /// start-up.
    pub fn load(&self, entries: HashMap<String, CacheEntry>) {
        let mut cache = self.cache.write().expect(MUTEX_POISON_MESSAGE);
        cache.entries = entries;
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn get_returns_none_for_missing_key() {
        let cache = SharedCache::new();
        assert_eq!(None, cache.get("example.com"));
    }

    #[test]
    fn set_then_get_round_trips() {
        let cache = SharedCache::new();
        cache.set("example.com", "93.184.216.34");
        assert_eq!(Some("93.184.216.34".to_string()), cache.get("example.com"));
    }

    #[test]
    fn expired_entry_is_treated_as_absent() {
        let cache = SharedCache::with_ttl(Duration::from_millis(1));
        cache.set("example.com", "93.184.216.34");
        sleep(Duration::from_millis(5));
        assert_eq!(None, cache.get("example.com"));
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let cache = SharedCache::new();
        cache.set("example.com", "1.2.3.4");
        cache.set("example.com", "5.6.7.8");
        assert_eq!(Some("5.6.7.8".to_string()), cache.get("example.com"));
    }

    #[test]
    fn snapshot_is_a_point_in_time_copy() {
        let cache = SharedCache::new();
        cache.set("example.com", "1.2.3.4");
        let snapshot = cache.snapshot();
        cache.set("example.com", "5.6.7.8");
        assert_eq!("1.2.3.4", snapshot.get("example.com").unwrap().ip);
    }
}
