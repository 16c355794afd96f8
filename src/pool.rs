//! Bounded pool of reusable, expensive-to-create objects (connections).

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    #[error("object is not a member of this pool")]
    NotInPool,
}

const DEFAULT_POOL_SIZE: usize = 16;

struct Entry<T> {
    object: T,
    busy: bool,
}

/// Bounded cache of objects identified by [`Clone`]-able handles (in
/// practice, `Arc<T>`), with `acquire`/`release` semantics.
///
/// There is no background eviction: objects live in the pool until the
/// pool itself is dropped.
pub struct ObjectPool<T> {
    entries: Mutex<Vec<Entry<T>>>,
    capacity: usize,
}

impl<T> ObjectPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl<T: Clone + PartialEq> ObjectPool<T> {
    /// Returns an idle object, creating a fresh one via `gen` if the pool
    /// has spare capacity. Returns `None` if the pool is full and every
    /// member is busy.
    pub fn acquire(&self, gen: impl FnOnce() -> T) -> Option<T> {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.iter_mut().find(|e| !e.busy) {
            entry.busy = true;
            return Some(entry.object.clone());
        }

        if entries.len() < self.capacity {
            let object = gen();
            entries.push(Entry {
                object: object.clone(),
                busy: true,
            });
            return Some(object);
        }

        None
    }

    pub fn release(&self, object: &T) -> Result<(), PoolError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| &e.object == object)
            .ok_or(PoolError::NotInPool)?;
        entry.busy = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_up_to_capacity() {
        let pool: ObjectPool<u32> = ObjectPool::new(2);
        let mut next = 0u32;
        let mut gen = || {
            next += 1;
            next
        };

        let a = pool.acquire(&mut gen).unwrap();
        let b = pool.acquire(&mut gen).unwrap();
        assert_ne!(a, b);
        assert!(pool.acquire(&mut gen).is_none());
    }

    #[test]
    fn release_makes_object_reusable() {
        let pool: ObjectPool<u32> = ObjectPool::new(1);
        let a = pool.acquire(|| 42).unwrap();
        assert!(pool.acquire(|| 43).is_none());
        pool.release(&a).unwrap();
        let b = pool.acquire(|| 43).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn release_non_member_fails() {
        let pool: ObjectPool<u32> = ObjectPool::new(1);
        assert!(matches!(pool.release(&7), Err(PoolError::NotInPool)));
    }
}
