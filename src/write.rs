//! Write pipeline: hash pages, optionally dedup via the DHT, fan out
//! replica writes with per-replica retry, obtain a version ticket,
//! commit metadata, and publish.

use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::dht::DhtGateway;
use crate::error::{Error, Result};
use crate::metadata::{ObjectId, PageKey, Query, ReplicaList};
use crate::protocol::catalog::PROVIDER_WRITE;
use crate::publisher::PublisherClient;
use crate::resolver::MetadataResolver;
use crate::rpc::Dispatcher;
use crate::vmgr::VmgrClient;

/// Tunables the object API threads through to one write call.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub replica_count: u32,
    pub retry_count: u32,
    pub deduplication: bool,
}

/// Writes `buffer` at `offset` (both must be page-size multiples).
/// `append` requests the version manager pick the real offset.
///
/// Returns the new version on success, `Ok(0)` if the write could not
/// complete (a transient failure, not an `Err`). Misaligned offset/size
/// is an `Err`.
#[instrument(skip(dispatcher, resolver, dht, publisher, vmgr, buffer), fields(object_id = object_id.0))]
#[allow(clippy::too_many_arguments)]
pub async fn write(
    dispatcher: &Dispatcher,
    resolver: &dyn MetadataResolver,
    dht: &DhtGateway,
    publisher: &PublisherClient,
    vmgr: &VmgrClient,
    object_id: ObjectId,
    page_size: u64,
    offset: u64,
    size: u64,
    buffer: &[u8],
    append: bool,
    opts: WriteOptions,
) -> Result<u32> {
    if page_size == 0 || offset % page_size != 0 || size % page_size != 0 {
        return Err(Error::Unaligned {
            offset,
            size,
            page_size,
        });
    }
    if size == 0 {
        return Ok(0);
    }
    debug_assert_eq!(buffer.len() as u64, size);

    let num_pages = (size / page_size) as usize;

    // 1. Placement.
    let adv = match publisher
        .get(dispatcher, (num_pages * opts.replica_count as usize) as u64, opts.replica_count)
        .await
    {
        Ok(adv) => adv,
        Err(err) => {
            warn!(%err, "publisher could not place write");
            return Ok(0);
        }
    };

    // 2. Hashing.
    let page_keys: Vec<PageKey> = (0..num_pages)
        .map(|i| {
            let start = i * page_size as usize;
            let end = start + page_size as usize;
            PageKey::of(&buffer[start..end])
        })
        .collect();

    // 3/4. Dedup (when enabled) and fan-out writes.
    let mut satisfied = vec![false; num_pages * opts.replica_count as usize];
    let mut to_write: Vec<usize> = (0..num_pages).collect();

    if opts.deduplication {
        let mut first_occurrence: std::collections::HashMap<PageKey, usize> = std::collections::HashMap::new();
        let mut needs_probe = Vec::new();
        for &i in &to_write {
            if let Some(&k) = first_occurrence.get(&page_keys[i]) {
                mark_page_satisfied(&mut satisfied, i, opts.replica_count);
                info!(page = i, duplicate_of = k, "duplicate page suppressed (local)");
            } else {
                first_occurrence.insert(page_keys[i], i);
                needs_probe.push(i);
            }
        }

        let probes: Vec<_> = needs_probe.iter().map(|&i| (i, dht.get(page_keys[i]))).collect();
        dht.wait(dispatcher).await;

        let mut still_needs_write = Vec::new();
        for (i, rx) in probes {
            let found = rx.await.map(|v| !v.is_empty()).unwrap_or(false);
            if found {
                mark_page_satisfied(&mut satisfied, i, opts.replica_count);
                info!(page = i, "duplicate page suppressed (DHT)");
            } else {
                still_needs_write.push(i);
            }
        }
        to_write = still_needs_write;
    }

    let writes = to_write.iter().map(|&i| {
        write_page(
            dispatcher,
            &adv,
            i,
            opts.replica_count,
            page_keys[i],
            &buffer[i * page_size as usize..(i + 1) * page_size as usize],
            opts.retry_count,
        )
    });
    let results = futures::future::join_all(writes).await;
    for (&i, bits) in to_write.iter().zip(results.into_iter()) {
        let base = i * opts.replica_count as usize;
        for (j, ok) in bits.into_iter().enumerate() {
            satisfied[base + j] = ok;
        }
    }

    if opts.deduplication {
        // Puts for newly-written pages so later writers can dedup against them.
        for &i in &to_write {
            let base = i * opts.replica_count as usize;
            if satisfied[base..base + opts.replica_count as usize].iter().any(|&b| b) {
                let start = i * page_size as usize;
                let end = start + page_size as usize;
                let _ = dht.put(page_keys[i], Bytes::copy_from_slice(&buffer[start..end]));
            }
        }
        dht.wait(dispatcher).await;
    }

    // 6. Page quorum.
    for page in 0..num_pages {
        let base = page * opts.replica_count as usize;
        if !satisfied[base..base + opts.replica_count as usize].iter().any(|&b| b) {
            warn!(page, "no replica succeeded for page, aborting write");
            return Ok(0);
        }
    }

    // 7. Ticket.
    let query = Query {
        object_id,
        version: 0,
        offset: if append { 0 } else { offset },
        size,
    };
    let reply = match vmgr.get_ticket(dispatcher, query, append).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(%err, "could not obtain version ticket");
            return Ok(0);
        }
    };
    let committed = match reply.committed_range() {
        Some(range) => range,
        None => return Ok(0),
    };

    // 8. Metadata commit.
    if resolver
        .write_record_locations(&reply, &page_keys, &adv)
        .await
        .is_err()
    {
        warn!("metadata commit failed");
        return Ok(0);
    }

    // 9. Publish.
    match vmgr.publish(dispatcher, committed).await {
        Ok(true) => Ok(committed.version),
        _ => Ok(0),
    }
}

fn mark_page_satisfied(satisfied: &mut [bool], page: usize, replica_count: u32) {
    let base = page * replica_count as usize;
    for bit in &mut satisfied[base..base + replica_count as usize] {
        *bit = true;
    }
}

/// Writes one page to its `replica_count` assigned replicas, retrying
/// each failed replica independently (same replica, never a fallback).
/// Makes an initial attempt plus up to `retry_count` redispatches (i.e.
/// `retry_count + 1` attempts total), matching a retry counter that
/// starts at the first attempt rather than counting only redispatches.
/// Returns the per-replica success bitset.
async fn write_page(
    dispatcher: &Dispatcher,
    adv: &ReplicaList,
    page_index: usize,
    replica_count: u32,
    key: PageKey,
    value: &[u8],
    retry_count: u32,
) -> Vec<bool> {
    let base = page_index * replica_count as usize;
    let replicas = &adv.0[base..base + replica_count as usize];
    let value = Bytes::copy_from_slice(value);

    let futures = replicas.iter().map(|replica| {
        let value = value.clone();
        async move {
            let addr = replica.address();
            for _ in 0..=retry_count {
                let params = vec![Bytes::copy_from_slice(&key.0), value.clone()];
                let (status, _) = dispatcher.dispatch(&addr, PROVIDER_WRITE, params).await;
                if status.is_ok() {
                    return true;
                }
                warn!(addr = %addr, ?status, "replica write failed, retrying");
            }
            false
        }
    });
    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_page_satisfied_sets_only_that_pages_bits() {
        let mut bits = vec![false; 6];
        mark_page_satisfied(&mut bits, 1, 3);
        assert_eq!(bits, vec![false, false, false, true, true, true]);
    }
}
