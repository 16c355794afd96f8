//! DHT gateway client: a sharded, batching `Map<PageKey, Bytes>` used by
//! the write pipeline to detect and suppress duplicate pages.

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::metadata::PageKey;
use crate::protocol::catalog::{PROVIDER_READ, PROVIDER_REMOVE, PROVIDER_WRITE};
use crate::protocol::Status;
use crate::rpc::Dispatcher;

struct GatewayQueue {
    addr: String,
    pending_gets: Vec<(PageKey, oneshot::Sender<Bytes>)>,
    pending_puts: Vec<(PageKey, Bytes, oneshot::Sender<bool>)>,
    pending_removes: Vec<(PageKey, oneshot::Sender<bool>)>,
}

impl GatewayQueue {
    fn new(addr: String) -> Self {
        Self {
            addr,
            pending_gets: Vec::new(),
            pending_puts: Vec::new(),
            pending_removes: Vec::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.pending_gets.is_empty() && self.pending_puts.is_empty() && self.pending_removes.is_empty()
    }
}

/// Sharded batching client over a static list of DHT gateway endpoints.
pub struct DhtGateway {
    gateways: Mutex<Vec<GatewayQueue>>,
}

impl DhtGateway {
    pub fn new(gateway_addrs: Vec<String>) -> Self {
        assert!(!gateway_addrs.is_empty(), "at least one DHT gateway is required");
        Self {
            gateways: Mutex::new(gateway_addrs.into_iter().map(GatewayQueue::new).collect()),
        }
    }

    fn choose_gateway(&self, key: &PageKey) -> usize {
        sdbm_hash(&key.0) as usize % self.gateways.lock().len()
    }

    /// Enqueues a `get` and returns a future resolving to the stored
    /// value, or empty `Bytes` if the key is absent (or the probing RPC
    /// failed). The future only resolves once [`DhtGateway::wait`] has
    /// flushed the gateway it was sharded to.
    pub fn get(&self, key: PageKey) -> oneshot::Receiver<Bytes> {
        let (tx, rx) = oneshot::channel();
        let idx = self.choose_gateway(&key);
        self.gateways.lock()[idx].pending_gets.push((key, tx));
        rx
    }

    /// Enqueues a `put`. Re-putting the same key with the same content is
    /// idempotent since pages are content-addressed.
    pub fn put(&self, key: PageKey, value: Bytes) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let idx = self.choose_gateway(&key);
        self.gateways.lock()[idx].pending_puts.push((key, value, tx));
        rx
    }

    /// Deletes a key from the index via a real batched delete RPC (see
    /// DESIGN.md for why this is implemented rather than stubbed).
    pub fn remove(&self, key: PageKey) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let idx = self.choose_gateway(&key);
        self.gateways.lock()[idx].pending_removes.push((key, tx));
        rx
    }

    /// Repeatedly flushes every gateway with pending work until all
    /// queues are empty.
    pub async fn wait(&self, dispatcher: &Dispatcher) {
        loop {
            let (gets, puts, removes) = self.drain_rounds();
            if gets.is_empty() && puts.is_empty() && removes.is_empty() {
                return;
            }

            for (addr, keys, senders) in gets {
                let params: Vec<Bytes> = keys.iter().map(|k| Bytes::copy_from_slice(&k.0)).collect();
                let (status, results) = dispatcher.dispatch(&addr, PROVIDER_READ, params).await;
                for (i, tx) in senders.into_iter().enumerate() {
                    let value = if status.is_ok() || status == Status::EObj {
                        results.get(i).cloned().unwrap_or_default()
                    } else {
                        Bytes::new()
                    };
                    let _ = tx.send(value);
                }
            }

            for (addr, key_values, senders) in puts {
                let mut params = Vec::with_capacity(key_values.len() * 2);
                for (key, value) in &key_values {
                    params.push(Bytes::copy_from_slice(&key.0));
                    params.push(value.clone());
                }
                let (status, _) = dispatcher.dispatch(&addr, PROVIDER_WRITE, params).await;
                for tx in senders {
                    let _ = tx.send(status.is_ok());
                }
            }

            for (addr, keys, senders) in removes {
                let params: Vec<Bytes> = keys.iter().map(|k| Bytes::copy_from_slice(&k.0)).collect();
                let (status, _) = dispatcher.dispatch(&addr, PROVIDER_REMOVE, params).await;
                for tx in senders {
                    let _ = tx.send(status.is_ok());
                }
            }

            debug!("DHT flush round complete");
        }
    }

    #[allow(clippy::type_complexity)]
    fn drain_rounds(
        &self,
    ) -> (
        Vec<(String, Vec<PageKey>, Vec<oneshot::Sender<Bytes>>)>,
        Vec<(String, Vec<(PageKey, Bytes)>, Vec<oneshot::Sender<bool>>)>,
        Vec<(String, Vec<PageKey>, Vec<oneshot::Sender<bool>>)>,
    ) {
        let mut gateways = self.gateways.lock();
        let mut gets = Vec::new();
        let mut puts = Vec::new();
        let mut removes = Vec::new();

        for gateway in gateways.iter_mut() {
            if !gateway.pending_gets.is_empty() {
                let batch = std::mem::take(&mut gateway.pending_gets);
                let (keys, senders): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
                gets.push((gateway.addr.clone(), keys, senders));
            }
            if !gateway.pending_puts.is_empty() {
                let batch = std::mem::take(&mut gateway.pending_puts);
                let mut key_values = Vec::with_capacity(batch.len());
                let mut senders = Vec::with_capacity(batch.len());
                for (key, value, tx) in batch {
                    key_values.push((key, value));
                    senders.push(tx);
                }
                puts.push((gateway.addr.clone(), key_values, senders));
            }
            if !gateway.pending_removes.is_empty() {
                let batch = std::mem::take(&mut gateway.pending_removes);
                let (keys, senders): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
                removes.push((gateway.addr.clone(), keys, senders));
            }
        }

        (gets, puts, removes)
    }
}

/// The sdbm string-hashing function, used to shard page keys across
/// gateways.
fn sdbm_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &b in bytes {
        hash = (b as u32)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash);
    }
    hash
}
