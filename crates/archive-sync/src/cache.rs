//! Runtime settings cache.
//!
//! An explicit, injectable TTL cache for settings that are loaded from an
//! external source and may change while the process runs (for instance the
//! import concurrency). Entries expire after the configured TTL; callers
//! treat a miss as "use the configured default".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

/// Key holding the runtime override for import concurrency.
pub const IMPORT_CONCURRENCY_KEY: &str = "import.concurrency";

/// TTL cache of string settings. Cloning shares the underlying cache.
#[derive(Clone)]
pub struct SettingsCache {
    inner: Cache<String, Arc<str>>,
}

impl SettingsCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|v| v.to_string())
    }

    /// Reads a setting and parses it, ignoring values that do not parse.
    pub fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring unparsable cached setting {}={}", key, raw);
                None
            }
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl AsRef<str>) {
        self.inner.insert(key.into(), Arc::from(value.as_ref()));
    }

    /// Replaces the listed keys in one call, e.g. after reading the settings
    /// table. Keys not present in `entries` are left as they are.
    pub fn bulk_load(&self, entries: HashMap<String, String>) {
        let count = entries.len();
        for (key, value) in entries {
            self.set(key, value);
        }
        log::debug!("Loaded {} settings into cache", count);
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_invalidate() {
        let cache = SettingsCache::default();
        assert!(cache.get("a").is_none());

        cache.set("a", "1");
        assert_eq!(cache.get("a").as_deref(), Some("1"));

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_bulk_load_and_invalidate_all() {
        let cache = SettingsCache::default();
        cache.set("keep", "x");
        cache.bulk_load(HashMap::from([
            (IMPORT_CONCURRENCY_KEY.to_string(), "4".to_string()),
            ("other".to_string(), "y".to_string()),
        ]));

        assert_eq!(cache.get_parsed::<usize>(IMPORT_CONCURRENCY_KEY), Some(4));
        assert_eq!(cache.get("keep").as_deref(), Some("x"));

        cache.invalidate_all();
        assert!(cache.get("other").is_none());
        assert!(cache.get("keep").is_none());
    }

    #[test]
    fn test_get_parsed_rejects_garbage() {
        let cache = SettingsCache::default();
        cache.set(IMPORT_CONCURRENCY_KEY, "lots");
        assert_eq!(cache.get_parsed::<usize>(IMPORT_CONCURRENCY_KEY), None);
    }

    #[test]
    fn test_entries_expire() {
        let cache = SettingsCache::new(Duration::from_millis(20), 16);
        cache.set("a", "1");
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = SettingsCache::default();
        let other = cache.clone();
        cache.set("a", "1");
        assert_eq!(other.get("a").as_deref(), Some("1"));
    }
}
