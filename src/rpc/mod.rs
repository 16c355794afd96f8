//! RPC framing and dispatcher: encodes/decodes length-prefixed frames over
//! plain TCP, multiplexing many in-flight calls by awaiting them together.
//!
//! Progress is driven by `.await`ing the join of a batch of [`Dispatcher::flush`]
//! futures between pipeline stages — there is no separate "pump the event
//! loop" step to call out.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::connection::transport::Transport;
use crate::protocol::frame::{Frame, FrameHeader};
use crate::protocol::traits::{ReadType, WriteType};
use crate::protocol::Status;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared, keyed cache of live connections. Addresses are not
/// interchangeable (unlike [`crate::pool::ObjectPool`]'s generic
/// objects), so this is a plain map rather than the bounded pool facility
/// — see DESIGN.md for why the two aren't the same data structure.
#[derive(Default)]
pub struct Dispatcher {
    connections: Mutex<HashMap<String, std::sync::Arc<AsyncMutex<Transport>>>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    async fn connection_for(
        &self,
        addr: &str,
    ) -> Result<std::sync::Arc<AsyncMutex<Transport>>, Status> {
        if let Some(conn) = self.connections.lock().get(addr).cloned() {
            return Ok(conn);
        }

        match Transport::connect(addr, Some(self.timeout)).await {
            Ok(transport) => {
                let conn = std::sync::Arc::new(AsyncMutex::new(transport));
                self.connections
                    .lock()
                    .insert(addr.to_owned(), conn.clone());
                Ok(conn)
            }
            Err(err) => {
                warn!(addr, %err, "could not connect to RPC peer");
                Err(Status::ConnectionError)
            }
        }
    }

    fn drop_connection(&self, addr: &str) {
        self.connections.lock().remove(addr);
    }

    /// Issues one RPC call and awaits its response.
    ///
    /// Never returns an `Err`: every failure mode (connect failure, I/O
    /// error, timeout, malformed response, application-level status) is
    /// folded into the returned [`Status`], so the caller always sees the
    /// failure reflected in the status itself.
    pub async fn dispatch(&self, addr: &str, name: u32, params: Vec<Bytes>) -> (Status, Vec<Bytes>) {
        let conn = match self.connection_for(addr).await {
            Ok(conn) => conn,
            Err(status) => return (status, Vec::new()),
        };

        let call = async {
            let mut guard = conn.lock().await;
            let frame = Frame::request(name, params);
            let mut buf = Vec::new();
            if let Err(err) = frame.write(&mut buf) {
                warn!(addr, %err, "could not encode RPC frame");
                return Err(());
            }
            if let Err(err) = guard.stream.write_all(&buf).await {
                warn!(addr, %err, "could not write RPC frame");
                return Err(());
            }

            let header = match read_header(&mut guard.stream).await {
                Ok(h) => h,
                Err(err) => {
                    warn!(addr, %err, "could not read RPC response header");
                    return Err(());
                }
            };

            let mut response_params = Vec::with_capacity(header.psize as usize);
            for _ in 0..header.psize {
                match read_bytes(&mut guard.stream).await {
                    Ok(b) => response_params.push(b),
                    Err(err) => {
                        warn!(addr, %err, "could not read RPC response parameter");
                        return Err(());
                    }
                }
            }

            debug!(addr, name, status = header.status, "RPC completed");
            Ok((Status::from_code(header.status), response_params))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(())) => {
                self.drop_connection(addr);
                (Status::ConnectionError, Vec::new())
            }
            Err(_) => {
                self.drop_connection(addr);
                (Status::Timeout, Vec::new())
            }
        }
    }

    /// Awaits a batch of outstanding calls together, so a pipeline stage
    /// only proceeds once every call it issued has resolved.
    pub async fn flush<F>(&self, calls: Vec<F>) -> Vec<(Status, Vec<Bytes>)>
    where
        F: std::future::Future<Output = (Status, Vec<Bytes>)>,
    {
        futures::future::join_all(calls).await
    }
}

async fn read_header(
    stream: &mut tokio::net::TcpStream,
) -> std::io::Result<FrameHeader> {
    let mut buf = [0u8; 12];
    stream.read_exact(&mut buf).await?;
    let mut cursor = std::io::Cursor::new(buf);
    FrameHeader::read(&mut cursor)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

async fn read_bytes(stream: &mut tokio::net::TcpStream) -> std::io::Result<Bytes> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut data = vec![0u8; len];
    stream.read_exact(&mut data).await?;
    Ok(Bytes::from(data))
}
