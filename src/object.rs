//! Public object API: the façade that stitches the RPC dispatcher,
//! version cache, DHT gateway, and read/write pipelines together.

use tracing::instrument;

use crate::config::Config;
use crate::dht::DhtGateway;
use crate::error::{Error, Result};
use crate::metadata::{ObjectId, PageLocation, ProviderDesc, Query, Root};
use crate::publisher::PublisherClient;
use crate::read;
use crate::resolver::MetadataResolver;
use crate::rpc::Dispatcher;
use crate::version_cache::VersionCache;
use crate::vmgr::VmgrClient;
use crate::write::{self, WriteOptions};

/// Drives one object's lifecycle: create/clone/read/write/append plus
/// the ancillary location and sizing queries.
///
/// A single handler's pipelines never interleave with each other (no
/// interior call runs two pipelines of the same handler concurrently);
/// nothing prevents running several handlers concurrently on the same
/// runtime.
pub struct ObjectHandler {
    dispatcher: Dispatcher,
    resolver: Box<dyn MetadataResolver>,
    dht: DhtGateway,
    publisher: PublisherClient,
    vmgr: VmgrClient,
    version_cache: VersionCache,
    config: Config,
    object_id: ObjectId,
    latest_root: Root,
}

impl ObjectHandler {
    pub fn new(config: Config, resolver: Box<dyn MetadataResolver>) -> Result<Self> {
        config.validate()?;
        let dht = DhtGateway::new(config.dht_gateways.clone());
        let publisher = PublisherClient::new(config.pmanager_host.clone(), config.pmanager_service.clone());
        let vmgr = VmgrClient::new(config.vmanager_host.clone(), config.vmanager_service.clone());
        Ok(Self {
            dispatcher: Dispatcher::with_timeout(config.dht_timeout),
            resolver,
            dht,
            publisher,
            vmgr,
            version_cache: VersionCache::new(config.dht_cachesize),
            object_id: ObjectId(0),
            config,
            latest_root: Root::empty(),
        })
    }

    fn write_opts(&self) -> WriteOptions {
        WriteOptions {
            replica_count: self.config.dht_replication,
            retry_count: self.config.provider_retry,
            deduplication: self.config.provider_deduplication,
        }
    }

    #[instrument(skip(self))]
    pub async fn create(&mut self, page_size: u64, replica_count: u32) -> Result<Root> {
        let root = self.vmgr.create(&self.dispatcher, page_size, replica_count).await?;
        self.object_id = root.object_id;
        self.latest_root = root.clone();
        Ok(root)
    }

    #[instrument(skip(self))]
    pub async fn clone_from(&mut self, src_id: ObjectId, src_version: u32) -> Result<Root> {
        if src_version == 0 && self.latest_root.is_uninitialized() {
            return Err(Error::Uninitialized);
        }
        let root = self.vmgr.clone_object(&self.dispatcher, src_id, src_version).await?;
        if root.is_uninitialized() {
            return Err(Error::Uninitialized);
        }
        self.object_id = root.object_id;
        self.latest_root = root.clone();
        Ok(root)
    }

    #[instrument(skip(self))]
    pub async fn get_latest(&mut self, id: Option<ObjectId>) -> Result<Root> {
        let id = id.unwrap_or(self.object_id);
        let root = self.vmgr.get_root(&self.dispatcher, id, 0).await?;
        self.object_id = id;
        self.latest_root = root.clone();
        Ok(root)
    }

    /// Resolves a version's root, preferring the version cache and
    /// falling back to the version manager; version 0 always means "use
    /// `latest_root`" and is never cached.
    async fn resolve_root(&mut self, version: u32) -> Result<Root> {
        if version == 0 {
            return Ok(self.latest_root.clone());
        }
        if let Some(root) = self.version_cache.read(version) {
            return Ok(root);
        }
        let root = self.vmgr.get_root(&self.dispatcher, self.object_id, version).await?;
        self.version_cache.write(version, root.clone());
        Ok(root)
    }

    pub async fn get_size(&mut self, version: u32) -> Result<u64> {
        Ok(self.resolve_root(version).await?.total_size)
    }

    #[instrument(skip(self, buffer, prefetch_list))]
    pub async fn read(
        &mut self,
        offset: u64,
        size: u64,
        buffer: &mut [u8],
        version: u32,
        threshold: u32,
        prefetch_list: &mut Vec<ProviderDesc>,
    ) -> Result<bool> {
        let root = self.resolve_root(version).await?;
        if version != 0 && root.version < version {
            return Err(Error::VersionTooNew {
                requested: version,
                latest: root.version,
            });
        }
        read::read(
            &self.dispatcher,
            self.resolver.as_ref(),
            &root,
            offset,
            size,
            buffer,
            threshold,
            prefetch_list,
            self.config.provider_retry,
        )
        .await
    }

    #[instrument(skip(self, buffer))]
    pub async fn write(&mut self, offset: u64, size: u64, buffer: &[u8]) -> Result<u32> {
        let page_size = self.latest_root.page_size;
        let version = write::write(
            &self.dispatcher,
            self.resolver.as_ref(),
            &self.dht,
            &self.publisher,
            &self.vmgr,
            self.object_id,
            page_size,
            offset,
            size,
            buffer,
            false,
            self.write_opts(),
        )
        .await?;
        if version != 0 {
            self.latest_root.version = version;
            self.latest_root.total_size = self.latest_root.total_size.max(offset + size);
        }
        Ok(version)
    }

    #[instrument(skip(self, buffer))]
    pub async fn append(&mut self, size: u64, buffer: &[u8]) -> Result<u32> {
        let page_size = self.latest_root.page_size;
        let version = write::write(
            &self.dispatcher,
            self.resolver.as_ref(),
            &self.dht,
            &self.publisher,
            &self.vmgr,
            self.object_id,
            page_size,
            0,
            size,
            buffer,
            true,
            self.write_opts(),
        )
        .await?;
        if version != 0 {
            self.latest_root.version = version;
            self.latest_root.total_size += size;
        }
        Ok(version)
    }

    #[instrument(skip(self))]
    pub async fn get_locations(&mut self, offset: u64, size: u64, version: u32) -> Result<Vec<PageLocation>> {
        let root = self.resolve_root(version).await?;
        let page_size = root.page_size;
        let aligned_offset = (offset / page_size) * page_size;
        let n_pages = ((offset + size - aligned_offset) + page_size - 1) / page_size;
        let query = Query {
            object_id: root.object_id,
            version: root.version,
            offset: aligned_offset,
            size: n_pages * page_size,
        };
        let mut prefetch = Vec::new();
        let handles = self
            .resolver
            .resolve_range(query, u32::MAX, &mut prefetch)
            .await?;

        let mut locations = Vec::new();
        for (i, handle) in handles.into_iter().enumerate() {
            for replica in handle.selector.into_replicas() {
                locations.push(PageLocation {
                    provider: replica,
                    page_offset: aligned_offset + (i as u64) * page_size,
                    page_size,
                });
            }
        }
        Ok(locations)
    }

    #[instrument(skip(self))]
    pub async fn get_objcount(&self) -> Result<i32> {
        self.vmgr.get_objcount(&self.dispatcher).await
    }
}
