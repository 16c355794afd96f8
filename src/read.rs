//! Read pipeline: resolve a byte range to per-page replica locations,
//! fan out aligned/unaligned page reads, and retry failed pages by
//! cycling replicas.

use bytes::Bytes;
use tracing::{instrument, warn};

use crate::error::{Error, Result};
use crate::metadata::{PageKey, ProviderDesc, Query, Root};
use crate::protocol::catalog::{PROVIDER_READ, PROVIDER_READ_PARTIAL};
use crate::resolver::MetadataResolver;
use crate::rpc::Dispatcher;

/// One aligned page's placement within the destination buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PagePlan {
    /// Byte offset into the caller's destination buffer.
    buf_offset: usize,
    /// Byte offset into the page itself where this read starts.
    skip: u64,
    /// Number of bytes to read.
    len: u64,
    /// Whether this plan covers the page in its entirety (zero-copy full
    /// page read) rather than a partial read.
    full: bool,
}

/// Splits `[offset, offset+size)` into per-page read plans aligned to
/// `page_size`. The first page's `skip` is non-zero for a left-partial
/// read; the last page's `len < page_size` for a right-partial read; a
/// single-page request collapses both into one partial plan, matching
/// the edge cases called out in the read pipeline's contract.
fn plan_pages(offset: u64, size: u64, page_size: u64) -> Vec<PagePlan> {
    if size == 0 {
        return Vec::new();
    }

    let aligned_offset = (offset / page_size) * page_size;
    let last_byte = offset + size;
    let span = last_byte - aligned_offset;
    let n_pages = (span + page_size - 1) / page_size;

    let mut plans = Vec::with_capacity(n_pages as usize);
    let mut buf_offset = 0usize;
    for i in 0..n_pages {
        let page_start = aligned_offset + i * page_size;
        let page_end = page_start + page_size;
        let read_start = page_start.max(offset);
        let read_end = page_end.min(last_byte);
        let len = read_end - read_start;
        let skip = read_start - page_start;
        plans.push(PagePlan {
            buf_offset,
            skip,
            len,
            full: skip == 0 && len == page_size,
        });
        buf_offset += len as usize;
    }
    plans
}

/// Reads `[offset, offset+size)` of `root`'s content into `buffer`.
///
/// Returns `Ok(true)` on success, `Ok(false)` if any page exhausted its
/// retry budget (a transient failure, not an `Err` — see the
/// error-handling design). Invariant violations (misaligned bounds,
/// uninitialized object) are `Err`.
#[instrument(skip(dispatcher, resolver, buffer, prefetch_list), fields(object_id = root.object_id.0, version = root.version))]
#[allow(clippy::too_many_arguments)]
pub async fn read(
    dispatcher: &Dispatcher,
    resolver: &dyn MetadataResolver,
    root: &Root,
    offset: u64,
    size: u64,
    buffer: &mut [u8],
    threshold: u32,
    prefetch_list: &mut Vec<ProviderDesc>,
    retry_count: u32,
) -> Result<bool> {
    if root.is_uninitialized() {
        return Err(Error::Uninitialized);
    }
    if offset + size > root.total_size {
        return Err(Error::InvalidRequest {
            offset,
            size,
            total_size: root.total_size,
        });
    }
    if size == 0 {
        return Ok(true);
    }
    debug_assert_eq!(buffer.len() as u64, size);

    let plans = plan_pages(offset, size, root.page_size);
    let aligned_offset = (offset / root.page_size) * root.page_size;
    let query = Query {
        object_id: root.object_id,
        version: root.version,
        offset: aligned_offset,
        size: plans.len() as u64 * root.page_size,
    };

    let handles = resolver
        .resolve_range(query, threshold, prefetch_list)
        .await?;
    if handles.len() != plans.len() {
        return Err(Error::ResolveFailed);
    }

    let mut chunks: Vec<&mut [u8]> = Vec::with_capacity(plans.len());
    let mut rest = buffer;
    for plan in &plans {
        let take = plan.len as usize;
        let (chunk, remainder) = rest.split_at_mut(take);
        chunks.push(chunk);
        rest = remainder;
    }

    let futures = plans
        .into_iter()
        .zip(handles.into_iter())
        .zip(chunks.into_iter())
        .map(|((plan, handle), chunk)| read_page(dispatcher, plan, handle.key, handle.selector, chunk, retry_count));

    let results = futures::future::join_all(futures).await;
    Ok(results.into_iter().all(|ok| ok))
}

async fn read_page(
    dispatcher: &Dispatcher,
    plan: PagePlan,
    key: PageKey,
    mut selector: crate::replica::ReplicaSelector,
    dest: &mut [u8],
    retry_count: u32,
) -> bool {
    let mut rounds = 0u32;
    loop {
        let replica = match selector.try_next() {
            Some(r) => r,
            None => {
                selector.try_again();
                rounds += 1;
                if rounds >= retry_count {
                    warn!(plan.buf_offset, "page read exhausted retry budget");
                    return false;
                }
                continue;
            }
        };

        let key_bytes = Bytes::copy_from_slice(&key.0);
        let (status, mut results) = if plan.full {
            dispatcher
                .dispatch(&replica.address(), PROVIDER_READ, vec![key_bytes])
                .await
        } else {
            let params = vec![
                key_bytes,
                Bytes::copy_from_slice(&plan.skip.to_be_bytes()),
                Bytes::copy_from_slice(&plan.len.to_be_bytes()),
            ];
            dispatcher
                .dispatch(&replica.address(), PROVIDER_READ_PARTIAL, params)
                .await
        };

        if status.is_ok() {
            if let Some(data) = results.pop() {
                let n = data.len().min(dest.len());
                dest[..n].copy_from_slice(&data[..n]);
                return true;
            }
        }
        warn!(addr = %replica.address(), ?status, "page read failed, trying next replica");
    }
}
