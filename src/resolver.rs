//! The metadata range-query engine lives outside this crate; this module
//! only defines the contract the read/write pipelines call against,
//! plus a simple in-memory implementation used by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::metadata::{PageKey, ProviderDesc, Query, ReplicaList, VmgrReply};
use crate::replica::ReplicaSelector;

/// One aligned page's content key plus the replicas that may hold it.
#[derive(Debug, Clone)]
pub struct PageHandle {
    pub key: PageKey,
    pub selector: ReplicaSelector,
}

/// Resolves byte ranges to per-page replica locations, and binds newly
/// written page keys into an object's metadata tree.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Returns one [`PageHandle`] per aligned page covering `query`, in
    /// page order. `prefetch_list` is an owned, mutable hint the
    /// resolver may populate with replicas worth warming ahead of need;
    /// callers are not required to act on it.
    async fn resolve_range(
        &self,
        query: Query,
        threshold: u32,
        prefetch_list: &mut Vec<ProviderDesc>,
    ) -> Result<Vec<PageHandle>>;

    /// Binds `page_keys` (one per page in `reply`'s committed range) to
    /// their placements in `adv`, making them part of the new version's
    /// metadata tree.
    async fn write_record_locations(
        &self,
        reply: &VmgrReply,
        page_keys: &[PageKey],
        adv: &ReplicaList,
    ) -> Result<()>;
}

/// In-memory resolver backing tests: tracks the page keys bound by each
/// `write_record_locations` call, keyed by `(object_id, version, page
/// offset)`, and returns the same keys for a matching `resolve_range`
/// call. Every page resolves to the same static replica list.
pub struct StaticResolver {
    replicas: Vec<ProviderDesc>,
    page_size: u64,
    bindings: Mutex<HashMap<(u32, u32, u64), PageKey>>,
}

impl StaticResolver {
    pub fn new(replicas: Vec<ProviderDesc>, page_size: u64) -> Self {
        Self {
            replicas,
            page_size,
            bindings: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MetadataResolver for StaticResolver {
    async fn resolve_range(
        &self,
        query: Query,
        _threshold: u32,
        _prefetch_list: &mut Vec<ProviderDesc>,
    ) -> Result<Vec<PageHandle>> {
        if self.replicas.is_empty() {
            return Err(Error::ResolveFailed);
        }
        let n_pages = (query.size / self.page_size).max(1) as usize;
        let bindings = self.bindings.lock();
        (0..n_pages)
            .map(|i| {
                let page_offset = query.offset + (i as u64) * self.page_size;
                let key = *bindings
                    .get(&(query.object_id.0, query.version, page_offset))
                    .ok_or(Error::ResolveFailed)?;
                Ok(PageHandle {
                    key,
                    selector: ReplicaSelector::new(self.replicas.clone()),
                })
            })
            .collect()
    }

    async fn write_record_locations(
        &self,
        reply: &VmgrReply,
        page_keys: &[PageKey],
        _adv: &ReplicaList,
    ) -> Result<()> {
        let range = reply.committed_range().ok_or(Error::CommitFailed)?;
        let mut bindings = self.bindings.lock();
        for (i, key) in page_keys.iter().enumerate() {
            let page_offset = range.offset + (i as u64) * self.page_size;
            bindings.insert((range.object_id.0, range.version, page_offset), *key);
        }
        Ok(())
    }
}
