//! Thin typed client for the publisher service: allocates provider
//! placements for new writes.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::metadata::ReplicaList;
use crate::protocol::catalog::PUBLISHER_GET;
use crate::protocol::traits::ReadType;
use crate::protocol::Status;
use crate::rpc::Dispatcher;

pub struct PublisherClient {
    addr: String,
}

impl PublisherClient {
    pub fn new(host: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            addr: format!("{}:{}", host.into(), service.into()),
        }
    }

    /// Requests `n_endpoints` provider placements, `replica_count` per
    /// page. Fails if the publisher returned fewer endpoints than asked.
    pub async fn get(
        &self,
        dispatcher: &Dispatcher,
        n_endpoints: u64,
        replica_count: u32,
    ) -> Result<ReplicaList> {
        let params = vec![
            Bytes::copy_from_slice(&n_endpoints.to_be_bytes()),
            Bytes::copy_from_slice(&replica_count.to_be_bytes()),
        ];
        let (status, mut results) = dispatcher.dispatch(&self.addr, PUBLISHER_GET, params).await;
        if !status.is_ok() {
            return Err(Error::Protocol("publisher.get".into(), status));
        }
        let payload = results.pop().ok_or(Error::Protocol("publisher.get".into(), Status::EArg))?;
        let replicas = ReplicaList::read(&mut std::io::Cursor::new(payload.as_ref()))?;
        if (replicas.0.len() as u64) < n_endpoints {
            return Err(Error::ResolveFailed);
        }
        Ok(replicas)
    }
}
