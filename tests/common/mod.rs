//! Shared loopback-TCP mock servers for the end-to-end tests: a
//! provider (backed by `MemStore`), a version manager, and a publisher,
//! all speaking the same RPC frame format the real `Dispatcher` uses.

use std::collections::HashMap;
use std::sync::Arc;

use blob_coordinator::metadata::{ObjectId, ProviderDesc, Query, ReplicaList, Root, VmgrReply};
use blob_coordinator::protocol::catalog::*;
use blob_coordinator::protocol::traits::{ReadType, WriteType};
use blob_coordinator::protocol::{Frame, FrameHeader, Status};
use blob_coordinator::provider::{MemStore, PageManager};
use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Handler = Arc<dyn Fn(u32, Vec<Bytes>) -> BoxFuture<'static, (Status, Vec<Bytes>)> + Send + Sync>;

/// Spawns a loopback TCP server dispatching every accepted frame to
/// `handler`. Returns the bound address.
pub async fn spawn_server(handler: Handler) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            tokio::spawn(serve_connection(stream, handler));
        }
    });

    addr
}

async fn serve_connection(mut stream: TcpStream, handler: Handler) {
    loop {
        let mut header_buf = [0u8; 12];
        if stream.read_exact(&mut header_buf).await.is_err() {
            return;
        }
        let header = FrameHeader::read(&mut std::io::Cursor::new(header_buf)).unwrap();

        let mut params = Vec::with_capacity(header.psize as usize);
        for _ in 0..header.psize {
            let mut len_buf = [0u8; 4];
            if stream.read_exact(&mut len_buf).await.is_err() {
                return;
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut data = vec![0u8; len];
            if stream.read_exact(&mut data).await.is_err() {
                return;
            }
            params.push(Bytes::from(data));
        }

        let (status, results) = handler(header.name, params).await;
        let response = Frame::response(header.name, status, results);
        let mut buf = Vec::new();
        response.write(&mut buf).unwrap();
        if stream.write_all(&buf).await.is_err() {
            return;
        }
    }
}

/// An in-memory version manager mock: `create`/`clone`/`get_root` mint
/// and track `Root`s; `get_ticket`/`publish` advance the version.
pub async fn spawn_vmgr() -> String {
    struct State {
        next_object_id: u32,
        roots: HashMap<(u32, u32), Root>,
    }

    let state = Arc::new(Mutex::new(State {
        next_object_id: 1,
        roots: HashMap::new(),
    }));

    let handler: Handler = Arc::new(move |name, params| {
        let state = state.clone();
        Box::pin(async move {
        let mut state = state.lock();
        match name {
            VMGR_CREATE => {
                let page_size = u64::from_be_bytes(params[0][..8].try_into().unwrap());
                let replica_count = u32::from_be_bytes(params[1][..4].try_into().unwrap());
                let object_id = ObjectId(state.next_object_id);
                state.next_object_id += 1;
                let root = Root {
                    object_id,
                    version: 0,
                    total_size: 0,
                    page_size,
                    replica_count,
                };
                state.roots.insert((object_id.0, 0), root.clone());
                let mut buf = Vec::new();
                root.write(&mut buf).unwrap();
                (Status::Ok, vec![Bytes::from(buf)])
            }
            VMGR_GETROOT => {
                let id = u32::from_be_bytes(params[0][..4].try_into().unwrap());
                let version = u32::from_be_bytes(params[1][..4].try_into().unwrap());
                let key = if version == 0 {
                    state
                        .roots
                        .keys()
                        .filter(|(o, _)| *o == id)
                        .max_by_key(|(_, v)| *v)
                        .copied()
                } else {
                    Some((id, version))
                };
                match key.and_then(|k| state.roots.get(&k)).cloned() {
                    Some(root) => {
                        let mut buf = Vec::new();
                        root.write(&mut buf).unwrap();
                        (Status::Ok, vec![Bytes::from(buf)])
                    }
                    None => (Status::EObj, Vec::new()),
                }
            }
            VMGR_CLONE => {
                let src_id = i32::from_be_bytes(params[0][..4].try_into().unwrap()) as u32;
                let src_version = i32::from_be_bytes(params[1][..4].try_into().unwrap()) as u32;
                let key = if src_version == 0 {
                    state
                        .roots
                        .keys()
                        .filter(|(o, _)| *o == src_id)
                        .max_by_key(|(_, v)| *v)
                        .copied()
                } else {
                    Some((src_id, src_version))
                };
                let src_root = key.and_then(|k| state.roots.get(&k)).cloned();
                match src_root {
                    Some(src) if src.page_size != 0 => {
                        let object_id = ObjectId(state.next_object_id);
                        state.next_object_id += 1;
                        let root = Root {
                            object_id,
                            version: 0,
                            total_size: src.total_size,
                            page_size: src.page_size,
                            replica_count: src.replica_count,
                        };
                        state.roots.insert((object_id.0, 0), root.clone());
                        let mut buf = Vec::new();
                        root.write(&mut buf).unwrap();
                        (Status::Ok, vec![Bytes::from(buf)])
                    }
                    // Source root missing or uninitialized: return the
                    // empty-root sentinel rather than an error status, so
                    // the client-side postcondition check is exercised.
                    _ => {
                        let mut buf = Vec::new();
                        Root::empty().write(&mut buf).unwrap();
                        (Status::Ok, vec![Bytes::from(buf)])
                    }
                }
            }
            VMGR_GETTICKET => {
                let mut cursor = std::io::Cursor::new(params[0].as_ref());
                let query = Query::read(&mut cursor).unwrap();
                let latest_version = state
                    .roots
                    .keys()
                    .filter(|(o, _)| *o == query.object_id.0)
                    .map(|(_, v)| *v)
                    .max()
                    .unwrap_or(0);
                let committed = Query {
                    object_id: query.object_id,
                    version: latest_version + 1,
                    offset: query.offset,
                    size: query.size,
                };
                let reply = VmgrReply {
                    intervals: vec![blob_coordinator::metadata::Interval { range: committed }],
                };
                let mut buf = Vec::new();
                reply.write(&mut buf).unwrap();
                (Status::Ok, vec![Bytes::from(buf)])
            }
            VMGR_PUBLISH => {
                let mut cursor = std::io::Cursor::new(params[0].as_ref());
                let range = Query::read(&mut cursor).unwrap();
                let previous = state
                    .roots
                    .get(&(range.object_id.0, range.version.saturating_sub(1)))
                    .cloned()
                    .unwrap_or(Root {
                        object_id: range.object_id,
                        version: 0,
                        total_size: 0,
                        page_size: 4096,
                        replica_count: 1,
                    });
                let root = Root {
                    object_id: range.object_id,
                    version: range.version,
                    total_size: previous.total_size.max(range.offset + range.size),
                    page_size: previous.page_size,
                    replica_count: previous.replica_count,
                };
                state.roots.insert((range.object_id.0, range.version), root);
                (Status::Ok, Vec::new())
            }
            VMGR_GETOBJNO => {
                let count = state.roots.keys().map(|(o, _)| *o).collect::<std::collections::HashSet<_>>().len();
                (Status::Ok, vec![Bytes::copy_from_slice(&(count as i32).to_be_bytes())])
            }
            _ => (Status::EArg, Vec::new()),
        }
        })
    });

    spawn_server(handler).await
}

/// A publisher mock that always places pages on one fixed provider.
pub async fn spawn_publisher(provider_addr: &str) -> String {
    let (host, service) = provider_addr.rsplit_once(':').unwrap();
    let host = host.to_owned();
    let service = service.to_owned();

    let handler: Handler = Arc::new(move |name, params| {
        let host = host.clone();
        let service = service.clone();
        Box::pin(async move {
            match name {
                PUBLISHER_GET => {
                    let n = u64::from_be_bytes(params[0][..8].try_into().unwrap());
                    let replicas = ReplicaList((0..n).map(|_| ProviderDesc::new(host.clone(), service.clone())).collect());
                    let mut buf = Vec::new();
                    replicas.write(&mut buf).unwrap();
                    (Status::Ok, vec![Bytes::from(buf)])
                }
                _ => (Status::EArg, Vec::new()),
            }
        })
    });

    spawn_server(handler).await
}

/// A provider mock backed by a real in-memory page store.
pub async fn spawn_provider() -> String {
    let manager = Arc::new(PageManager::new(MemStore::new(64 * 1024 * 1024)));
    let handler: Handler = Arc::new(move |name, params| {
        let manager = manager.clone();
        Box::pin(async move { manager.handle(name, params, "test-peer").await })
    });
    spawn_server(handler).await
}

/// A provider mock that rejects every write and has nothing to read,
/// simulating a replica that is up but permanently failing — used to
/// exercise quorum and retry behavior without a real store backing it.
pub async fn spawn_failing_provider() -> String {
    let handler: Handler = Arc::new(|name, _params| {
        Box::pin(async move {
            match name {
                PROVIDER_WRITE => (Status::ERes, Vec::new()),
                PROVIDER_READ | PROVIDER_PROBE => (Status::EObj, Vec::new()),
                PROVIDER_READ_PARTIAL => (Status::EObj, Vec::new()),
                _ => (Status::EArg, Vec::new()),
            }
        })
    });
    spawn_server(handler).await
}

/// A publisher mock that places each page's replicas on `providers`, in
/// order, cycling if fewer providers than requested slots are given.
pub async fn spawn_publisher_fixed(providers: Vec<String>) -> String {
    let handler: Handler = Arc::new(move |name, params| {
        let providers = providers.clone();
        Box::pin(async move {
            match name {
                PUBLISHER_GET => {
                    let n = u64::from_be_bytes(params[0][..8].try_into().unwrap());
                    let replicas = ReplicaList(
                        (0..n)
                            .map(|i| {
                                let addr = &providers[i as usize % providers.len()];
                                let (host, service) = addr.rsplit_once(':').unwrap();
                                ProviderDesc::new(host, service)
                            })
                            .collect(),
                    );
                    let mut buf = Vec::new();
                    replicas.write(&mut buf).unwrap();
                    (Status::Ok, vec![Bytes::from(buf)])
                }
                _ => (Status::EArg, Vec::new()),
            }
        })
    });
    spawn_server(handler).await
}
