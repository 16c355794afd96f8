//! Bounded `Version -> Root` cache.
//!
//! Version `0` (meaning "latest known") is never cached: it has no fixed
//! identity to key on.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::metadata::Root;

const DEFAULT_CACHE_SIZE: usize = 64;

pub struct VersionCache {
    entries: Mutex<LruCache<u32, Root>>,
}

impl VersionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn read(&self, version: u32) -> Option<Root> {
        if version == 0 {
            return None;
        }
        self.entries.lock().get(&version).cloned()
    }

    pub fn write(&self, version: u32, root: Root) {
        if version == 0 {
            return;
        }
        self.entries.lock().put(version, root);
    }
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ObjectId;

    fn root(version: u32) -> Root {
        Root {
            object_id: ObjectId(1),
            version,
            total_size: 0,
            page_size: 4096,
            replica_count: 3,
        }
    }

    #[test]
    fn version_zero_is_never_cached() {
        let cache = VersionCache::new(2);
        cache.write(0, root(0));
        assert!(cache.read(0).is_none());
    }

    #[test]
    fn caches_and_evicts_lru() {
        let cache = VersionCache::new(1);
        cache.write(1, root(1));
        assert_eq!(cache.read(1).unwrap().version, 1);

        cache.write(2, root(2));
        assert!(cache.read(1).is_none());
        assert_eq!(cache.read(2).unwrap().version, 2);
    }
}
