use thiserror::Error;

use crate::connection::transport;
use crate::pool::PoolError;
use crate::protocol::traits::{ReadError, WriteError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type.
///
/// Configuration and transport/protocol failures are genuine `Err`s.
/// Transient per-page/per-replica RPC failures absorbed by the retry
/// loops are *not* represented here: per the error-handling design,
/// `read`/`write`/`append` report those as a plain `bool`/`u32`, not an
/// `Err`, so the caller cannot mistake "ran out of retries" for a setup
/// error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] transport::Error),

    #[error("object pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("could not encode RPC frame: {0}")]
    Encode(#[from] WriteError),

    #[error("could not decode RPC frame: {0}")]
    Decode(#[from] ReadError),

    #[error("RPC to {0} returned unexpected status {1:?}")]
    Protocol(String, crate::protocol::Status),

    #[error("read beyond object size: offset {offset} + size {size} > total_size {total_size}")]
    InvalidRequest {
        offset: u64,
        size: u64,
        total_size: u64,
    },

    #[error("read/write attempted on an uninitialized object")]
    Uninitialized,

    #[error("write offset {offset} and size {size} must be multiples of page_size {page_size}")]
    Unaligned {
        offset: u64,
        size: u64,
        page_size: u64,
    },

    #[error("requested version {requested} is newer than the latest known version {latest}")]
    VersionTooNew { requested: u32, latest: u32 },

    #[error("metadata resolver could not resolve range locations")]
    ResolveFailed,

    #[error("metadata commit failed for the new version")]
    CommitFailed,
}
