//! Cache persistence (spec §3/§4.4/§6): the in-memory [`SharedCache`] is
//! snapshotted and written as a single JSON blob, grounded on
//! `examples/original_source/dnsmasq/store.go`'s `LoadCacheFromFile`/
//! `SaveCacheToFile` — same "missing file and empty file both load as an
//! empty map" behaviour, same single JSON object shape, same process-wide
//! write lock serialising the flush loop against any other writer (spec §5's
//! "Persistence lock").
//!
//! `Instant` (used by [`dns_resolver::cache::CacheEntry`] for monotonic TTL
//! comparison) has no wall-clock representation, so this module converts
//! between it and an RFC3339 timestamp at load/save time, recomputing each
//! entry's age from "now" rather than reusing the in-process clock.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use dns_resolver::cache::{CacheEntry, PersistedEntry, SharedCache};
use tokio::fs;
use tokio::sync::Mutex;

/// Process-wide write lock on the cache file, serialising the flush task
/// against any other writer (spec §5).
static PERSIST_LOCK: Mutex<()> = Mutex::const_new(());

pub async fn load(path: &str) -> Result<HashMap<String, CacheEntry>, Error> {
    let _guard = PERSIST_LOCK.lock().await;

    if !Path::new(path).exists() {
        return Ok(HashMap::new());
    }

    let bytes = fs::read(path).await.map_err(|source| Error::Read {
        path: path.to_string(),
        source,
    })?;

    if bytes.is_empty() {
        return Ok(HashMap::new());
    }

    let persisted: HashMap<String, PersistedEntry> =
        serde_json::from_slice(&bytes).map_err(|source| Error::Parse {
            path: path.to_string(),
            source,
        })?;

    let now_wall = SystemTime::now();
    let now_monotonic = Instant::now();
    let mut entries = HashMap::with_capacity(persisted.len());
    for (domain, entry) in persisted {
        let age = now_wall
            .duration_since(entry.timestamp.into())
            .unwrap_or(Duration::ZERO);
        entries.insert(
            domain,
            CacheEntry {
                ip: entry.ip,
                timestamp: now_monotonic
                    .checked_sub(age)
                    .unwrap_or(now_monotonic),
            },
        );
    }
    Ok(entries)
}

/// Write the cache's current snapshot to `path` as a single indented JSON
/// object, dropping any entry already expired (spec §3: "opportunistically
/// removed on persist").
pub async fn save(path: &str, cache: &SharedCache, ttl: Duration) -> Result<(), Error> {
    let _guard = PERSIST_LOCK.lock().await;

    let snapshot = cache.snapshot();
    let now_wall = chrono::Utc::now();
    let now_monotonic = Instant::now();

    let mut persisted = HashMap::with_capacity(snapshot.len());
    for (domain, entry) in snapshot {
        if entry.timestamp.elapsed() > ttl {
            continue;
        }
        let age = now_monotonic.duration_since(entry.timestamp);
        let timestamp = now_wall
            - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero());
        persisted.insert(domain, PersistedEntry { ip: entry.ip, timestamp });
    }

    let bytes = serde_json::to_vec_pretty(&persisted).map_err(|source| Error::Serialise {
        path: path.to_string(),
        source,
    })?;

    fs::write(path, bytes)
        .await
        .map_err(|source| Error::Write {
            path: path.to_string(),
            source,
        })
}

#[derive(Debug)]
pub enum Error {
    Read { path: String, source: std::io::Error },
    Write { path: String, source: std::io::Error },
    Parse { path: String, source: serde_json::Error },
    Serialise { path: String, source: serde_json::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Read { path, source } => write!(f, "could not read cache file {path}: {source}"),
            Error::Write { path, source } => write!(f, "could not write cache file {path}: {source}"),
            Error::Parse { path, source } => {
                write!(f, "could not parse cache file {path}: {source}")
            }
            Error::Serialise { path, source } => {
                write!(f, "could not serialise cache for {path}: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Read { source, .. } | Error::Write { source, .. } => Some(source),
            Error::Parse { source, .. } | Error::Serialise { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let entries = load("/nonexistent/path/does-not-exist.json").await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn empty_file_loads_as_empty() {
        let dir = std::env::temp_dir().join(format!("resolved-cache-store-test-{:?}", std::thread::current().id()));
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("cache.json");
        fs::write(&path, b"").await.unwrap();

        let entries = load(path.to_str().unwrap()).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_ip() {
        let dir = std::env::temp_dir().join(format!("resolved-cache-store-test-rt-{:?}", std::thread::current().id()));
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("cache.json");

        let cache = SharedCache::new();
        cache.set("example.com", "93.184.216.34");
        save(path.to_str().unwrap(), &cache, Duration::from_secs(600))
            .await
            .unwrap();

        let entries = load(path.to_str().unwrap()).await.unwrap();
        assert_eq!("93.184.216.34", entries.get("example.com").unwrap().ip);
    }

    #[tokio::test]
    async fn save_drops_expired_entries() {
        let dir = std::env::temp_dir().join(format!("resolved-cache-store-test-exp-{:?}", std::thread::current().id()));
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("cache.json");

        let cache = SharedCache::new();
        cache.set("example.com", "93.184.216.34");
        tokio::time::sleep(Duration::from_millis(5)).await;
        save(path.to_str().unwrap(), &cache, Duration::from_millis(1))
            .await
            .unwrap();

        let entries = load(path.to_str().unwrap()).await.unwrap();
        assert!(entries.is_empty());
    }
}
