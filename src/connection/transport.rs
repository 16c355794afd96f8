use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Connecting to {0} timed out")]
    ConnectTimeout(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A plain TCP connection to an RPC peer.
///
/// Peers are trusted processes within the storage cluster, so this
/// wraps a bare [`TcpStream`] rather than a TLS/SOCKS5-capable
/// transport.
#[derive(Debug)]
pub struct Transport {
    pub(crate) stream: TcpStream,
}

impl Transport {
    pub async fn connect(addr: &str, timeout: Option<Duration>) -> Result<Self> {
        let stream = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| Error::ConnectTimeout(addr.to_owned()))??,
            None => TcpStream::connect(addr).await?,
        };
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }
}
