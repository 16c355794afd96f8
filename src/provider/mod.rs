//! Provider page manager: the server-side core that answers
//! `PROVIDER_*` RPCs against a pluggable page store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use crate::metadata::PageKey;
use crate::protocol::catalog::{
    PROVIDER_PROBE, PROVIDER_READ, PROVIDER_READ_PARTIAL, PROVIDER_REMOVE, PROVIDER_WRITE,
};
use crate::protocol::Status;

/// Pluggable page store. Implementations only need to answer by content
/// key; this crate ships [`MemStore`] for tests and examples.
#[async_trait]
pub trait Persistency: Send + Sync {
    async fn read(&self, key: &PageKey) -> Option<Bytes>;
    async fn write(&self, key: PageKey, value: Bytes) -> bool;
    async fn remove(&self, key: &PageKey) -> bool;
    /// Free space remaining, reported to listeners alongside each
    /// successful write.
    async fn get_free(&self) -> u64;
}

/// In-memory [`Persistency`], bounded by a configured capacity in bytes.
pub struct MemStore {
    pages: Mutex<std::collections::HashMap<PageKey, Bytes>>,
    capacity: u64,
}

impl MemStore {
    pub fn new(capacity: u64) -> Self {
        Self {
            pages: Mutex::new(std::collections::HashMap::new()),
            capacity,
        }
    }

    fn used(&self) -> u64 {
        self.pages.lock().values().map(|v| v.len() as u64).sum()
    }
}

#[async_trait]
impl Persistency for MemStore {
    async fn read(&self, key: &PageKey) -> Option<Bytes> {
        self.pages.lock().get(key).cloned()
    }

    async fn write(&self, key: PageKey, value: Bytes) -> bool {
        let mut pages = self.pages.lock();
        if !pages.contains_key(&key) && self.used() + value.len() as u64 > self.capacity {
            return false;
        }
        pages.insert(key, value);
        true
    }

    async fn remove(&self, key: &PageKey) -> bool {
        self.pages.lock().remove(key).is_some()
    }

    async fn get_free(&self) -> u64 {
        self.capacity.saturating_sub(self.used())
    }
}

/// One update fired to listeners after a successful `PROVIDER_WRITE`.
#[derive(Debug, Clone)]
pub struct PageEvent {
    pub rpc: u32,
    pub key: PageKey,
    pub value: Bytes,
    pub sender: String,
    pub free_space: u64,
}

pub type Listener = Arc<dyn Fn(&PageEvent) + Send + Sync>;

/// The RPC-facing server core. Wraps a [`Persistency`] impl and a list
/// of synchronous listeners invoked on each successful write.
pub struct PageManager<P: Persistency> {
    store: P,
    listeners: Mutex<Vec<Listener>>,
}

impl<P: Persistency> PageManager<P> {
    pub fn new(store: P) -> Self {
        Self {
            store,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Listener) {
        self.listeners.lock().push(listener);
    }

    fn notify(&self, event: PageEvent) {
        for listener in self.listeners.lock().iter() {
            listener(&event);
        }
    }

    /// Handles any of the `PROVIDER_*` RPCs, dispatched on `name`.
    /// `sender` identifies the calling peer for listener events.
    pub async fn handle(&self, name: u32, params: Vec<Bytes>, sender: &str) -> (Status, Vec<Bytes>) {
        match name {
            PROVIDER_WRITE => self.handle_write(params, sender).await,
            PROVIDER_READ => self.handle_read(params).await,
            PROVIDER_PROBE => self.handle_probe(params).await,
            PROVIDER_READ_PARTIAL => self.handle_read_partial(params).await,
            PROVIDER_REMOVE => self.handle_remove(params).await,
            other => {
                warn!(rpc = other, "unknown provider RPC");
                (Status::EArg, Vec::new())
            }
        }
    }

    async fn handle_write(&self, params: Vec<Bytes>, sender: &str) -> (Status, Vec<Bytes>) {
        if params.len() < 2 || params.len() % 2 != 0 {
            return (Status::EArg, Vec::new());
        }

        for pair in params.chunks(2) {
            let key = match decode_key(&pair[0]) {
                Some(k) => k,
                None => return (Status::EArg, Vec::new()),
            };
            let value = pair[1].clone();
            if !self.store.write(key, value.clone()).await {
                return (Status::ERes, Vec::new());
            }
            let free_space = self.store.get_free().await;
            self.notify(PageEvent {
                rpc: PROVIDER_WRITE,
                key,
                value,
                sender: sender.to_owned(),
                free_space,
            });
        }
        (Status::Ok, Vec::new())
    }

    async fn handle_read(&self, params: Vec<Bytes>) -> (Status, Vec<Bytes>) {
        let mut results = Vec::with_capacity(params.len());
        let mut all_present = true;
        for raw in &params {
            let Some(key) = decode_key(raw) else {
                return (Status::EArg, Vec::new());
            };
            match self.store.read(&key).await {
                Some(v) => results.push(v),
                None => {
                    all_present = false;
                    results.push(Bytes::new());
                }
            }
        }
        (if all_present { Status::Ok } else { Status::EObj }, results)
    }

    async fn handle_probe(&self, params: Vec<Bytes>) -> (Status, Vec<Bytes>) {
        self.handle_read(params).await
    }

    async fn handle_read_partial(&self, params: Vec<Bytes>) -> (Status, Vec<Bytes>) {
        if params.len() != 3 {
            return (Status::EArg, Vec::new());
        }
        let Some(key) = decode_key(&params[0]) else {
            return (Status::EArg, Vec::new());
        };
        let (Some(offset), Some(size)) = (decode_u64(&params[1]), decode_u64(&params[2])) else {
            return (Status::EArg, Vec::new());
        };

        let Some(data) = self.store.read(&key).await else {
            return (Status::EObj, Vec::new());
        };
        let offset = offset as usize;
        let size = size as usize;
        if offset.checked_add(size).map(|end| end > data.len()).unwrap_or(true) {
            return (Status::EObj, Vec::new());
        }

        let slice = data.slice(offset..offset + size);
        self.notify(PageEvent {
            rpc: PROVIDER_READ_PARTIAL,
            key,
            value: slice.clone(),
            sender: String::new(),
            free_space: self.store.get_free().await,
        });
        (Status::Ok, vec![slice])
    }

    async fn handle_remove(&self, params: Vec<Bytes>) -> (Status, Vec<Bytes>) {
        let mut all_present = true;
        for raw in &params {
            let Some(key) = decode_key(raw) else {
                return (Status::EArg, Vec::new());
            };
            if !self.store.remove(&key).await {
                all_present = false;
            }
        }
        (if all_present { Status::Ok } else { Status::EObj }, Vec::new())
    }
}

fn decode_key(raw: &Bytes) -> Option<PageKey> {
    if raw.len() != 16 {
        return None;
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(raw);
    Some(PageKey(buf))
}

fn decode_u64(raw: &Bytes) -> Option<u64> {
    if raw.len() != 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Some(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: &[u8]) -> PageKey {
        PageKey::of(b)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let manager = PageManager::new(MemStore::new(1 << 20));
        let k = key(b"page one");
        let (status, _) = manager
            .handle(
                PROVIDER_WRITE,
                vec![Bytes::copy_from_slice(&k.0), Bytes::from_static(b"hello")],
                "peer-a",
            )
            .await;
        assert_eq!(status, Status::Ok);

        let (status, results) = manager
            .handle(PROVIDER_READ, vec![Bytes::copy_from_slice(&k.0)], "peer-a")
            .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(results[0], Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn read_missing_key_returns_eobj_but_still_fills_slot() {
        let manager = PageManager::new(MemStore::new(1 << 20));
        let k = key(b"missing");
        let (status, results) = manager
            .handle(PROVIDER_READ, vec![Bytes::copy_from_slice(&k.0)], "peer-a")
            .await;
        assert_eq!(status, Status::EObj);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_empty());
    }

    #[tokio::test]
    async fn write_with_odd_param_count_is_earg() {
        let manager = PageManager::new(MemStore::new(1 << 20));
        let (status, _) = manager
            .handle(PROVIDER_WRITE, vec![Bytes::from_static(b"only one")], "peer-a")
            .await;
        assert_eq!(status, Status::EArg);
    }

    #[tokio::test]
    async fn read_partial_out_of_bounds_is_eobj() {
        let manager = PageManager::new(MemStore::new(1 << 20));
        let k = key(b"short page");
        manager
            .handle(
                PROVIDER_WRITE,
                vec![Bytes::copy_from_slice(&k.0), Bytes::from_static(b"abc")],
                "peer-a",
            )
            .await;

        let (status, _) = manager
            .handle(
                PROVIDER_READ_PARTIAL,
                vec![
                    Bytes::copy_from_slice(&k.0),
                    Bytes::copy_from_slice(&0u64.to_be_bytes()),
                    Bytes::copy_from_slice(&100u64.to_be_bytes()),
                ],
                "peer-a",
            )
            .await;
        assert_eq!(status, Status::EObj);
    }

    #[tokio::test]
    async fn listener_observes_free_space_after_the_write_not_before() {
        let manager = PageManager::new(MemStore::new(10));
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        manager.add_listener(Arc::new(move |event: &PageEvent| {
            *seen2.lock() = Some(event.free_space);
        }));

        manager
            .handle(
                PROVIDER_WRITE,
                vec![Bytes::copy_from_slice(&key(b"page").0), Bytes::from_static(b"1234")],
                "peer-a",
            )
            .await;
        assert_eq!(*seen.lock(), Some(6));
    }

    #[tokio::test]
    async fn listener_observes_successful_writes() {
        let manager = PageManager::new(MemStore::new(1 << 20));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        manager.add_listener(Arc::new(move |event: &PageEvent| {
            seen2.lock().push(event.key);
        }));

        let k = key(b"observed page");
        manager
            .handle(
                PROVIDER_WRITE,
                vec![Bytes::copy_from_slice(&k.0), Bytes::from_static(b"x")],
                "peer-a",
            )
            .await;
        assert_eq!(seen.lock().as_slice(), &[k]);
    }
}
