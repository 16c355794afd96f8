//! Thin typed client for the version manager service: object lifecycle
//! (`create`/`clone`/`get_root`), ticket acquisition, and publish.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::metadata::{ObjectId, Query, Root, VmgrReply};
use crate::protocol::catalog::{
    VMGR_CLONE, VMGR_CREATE, VMGR_GETOBJNO, VMGR_GETROOT, VMGR_GETTICKET, VMGR_PUBLISH,
};
use crate::protocol::traits::{ReadType, WriteType};
use crate::protocol::Status;
use crate::rpc::Dispatcher;

pub struct VmgrClient {
    addr: String,
}

impl VmgrClient {
    pub fn new(host: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            addr: format!("{}:{}", host.into(), service.into()),
        }
    }

    async fn call_for_root(&self, dispatcher: &Dispatcher, name: u32, params: Vec<Bytes>) -> Result<Root> {
        let (status, mut results) = dispatcher.dispatch(&self.addr, name, params).await;
        if !status.is_ok() {
            return Err(Error::Protocol("vmgr".into(), status));
        }
        let payload = results.pop().ok_or(Error::Protocol("vmgr".into(), Status::EArg))?;
        Ok(Root::read(&mut std::io::Cursor::new(payload.as_ref()))?)
    }

    pub async fn create(&self, dispatcher: &Dispatcher, page_size: u64, replica_count: u32) -> Result<Root> {
        let params = vec![
            Bytes::copy_from_slice(&page_size.to_be_bytes()),
            Bytes::copy_from_slice(&replica_count.to_be_bytes()),
        ];
        self.call_for_root(dispatcher, VMGR_CREATE, params).await
    }

    pub async fn clone_object(&self, dispatcher: &Dispatcher, src_id: ObjectId, src_version: u32) -> Result<Root> {
        let params = vec![
            Bytes::copy_from_slice(&(src_id.0 as i32).to_be_bytes()),
            Bytes::copy_from_slice(&(src_version as i32).to_be_bytes()),
        ];
        self.call_for_root(dispatcher, VMGR_CLONE, params).await
    }

    pub async fn get_root(&self, dispatcher: &Dispatcher, id: ObjectId, version: u32) -> Result<Root> {
        let params = vec![
            Bytes::copy_from_slice(&id.0.to_be_bytes()),
            Bytes::copy_from_slice(&version.to_be_bytes()),
        ];
        self.call_for_root(dispatcher, VMGR_GETROOT, params).await
    }

    pub async fn get_ticket(&self, dispatcher: &Dispatcher, query: Query, append: bool) -> Result<VmgrReply> {
        let mut buf = Vec::new();
        query.write(&mut buf)?;
        let params = vec![Bytes::from(buf), Bytes::copy_from_slice(&[append as u8])];
        let (status, mut results) = dispatcher.dispatch(&self.addr, VMGR_GETTICKET, params).await;
        if !status.is_ok() {
            return Err(Error::Protocol("vmgr.get_ticket".into(), status));
        }
        let payload = results.pop().ok_or(Error::Protocol("vmgr.get_ticket".into(), Status::EArg))?;
        Ok(VmgrReply::read(&mut std::io::Cursor::new(payload.as_ref()))?)
    }

    pub async fn publish(&self, dispatcher: &Dispatcher, range: Query) -> Result<bool> {
        let mut buf = Vec::new();
        range.write(&mut buf)?;
        let (status, _) = dispatcher.dispatch(&self.addr, VMGR_PUBLISH, vec![Bytes::from(buf)]).await;
        Ok(status.is_ok())
    }

    pub async fn get_objcount(&self, dispatcher: &Dispatcher) -> Result<i32> {
        let (status, mut results) = dispatcher.dispatch(&self.addr, VMGR_GETOBJNO, Vec::new()).await;
        if !status.is_ok() {
            return Err(Error::Protocol("vmgr.get_objcount".into(), status));
        }
        let payload = results.pop().ok_or(Error::Protocol("vmgr.get_objcount".into(), Status::EArg))?;
        Ok(i32::read(&mut std::io::Cursor::new(payload.as_ref()))?)
    }
}
