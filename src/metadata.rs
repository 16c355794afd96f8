//! Core data model: object/version identifiers, provider descriptors,
//! metadata roots and range queries.

use std::io::{Read, Write};

use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

/// Object identifier, assigned by the version manager at `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// 128-bit content hash (MD5) of one page's bytes.
///
/// Equality of keys implies equality of contents for the purposes of
/// deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey(pub [u8; 16]);

impl PageKey {
    pub fn of(page: &[u8]) -> Self {
        let digest = md5::compute(page);
        Self(digest.0)
    }
}

impl<R: Read> ReadType<R> for PageKey {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf)?;
        Ok(Self(buf))
    }
}

impl<W: Write> WriteType<W> for PageKey {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&self.0)?;
        Ok(())
    }
}

/// `(host, service)` pair identifying one replica endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderDesc {
    pub host: String,
    pub service: String,
}

impl ProviderDesc {
    pub fn new(host: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
        }
    }

    /// The "no such replica" sentinel.
    pub fn empty() -> Self {
        Self {
            host: String::new(),
            service: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty() && self.service.is_empty()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.service)
    }
}

impl<R: Read> ReadType<R> for ProviderDesc {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            host: String::read(reader)?,
            service: String::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for ProviderDesc {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.host.write(writer)?;
        self.service.write(writer)?;
        Ok(())
    }
}

/// Ordered replica placements returned by the publisher, grouped
/// contiguously per page (`len == num_pages * replica_count`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaList(pub Vec<ProviderDesc>);

impl<R: Read> ReadType<R> for ReplicaList {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = u32::read(reader)? as usize;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            entries.push(ProviderDesc::read(reader)?);
        }
        Ok(Self(entries))
    }
}

impl<W: Write> WriteType<W> for ReplicaList {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        (self.0.len() as u32).write(writer)?;
        for entry in &self.0 {
            entry.write(writer)?;
        }
        Ok(())
    }
}

/// Immutable metadata snapshot for one `(object_id, version)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    pub object_id: ObjectId,
    pub version: u32,
    pub total_size: u64,
    pub page_size: u64,
    pub replica_count: u32,
}

impl Root {
    /// The sentinel empty root returned before any `create`/`clone`/`get_latest`.
    pub fn empty() -> Self {
        Self {
            object_id: ObjectId(0),
            version: 0,
            total_size: 0,
            page_size: 0,
            replica_count: 0,
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        self.page_size == 0
    }
}

impl<R: Read> ReadType<R> for Root {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            object_id: ObjectId(u32::read(reader)?),
            version: u32::read(reader)?,
            total_size: u64::read(reader)?,
            page_size: u64::read(reader)?,
            replica_count: u32::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for Root {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.object_id.0.write(writer)?;
        self.version.write(writer)?;
        self.total_size.write(writer)?;
        self.page_size.write(writer)?;
        self.replica_count.write(writer)?;
        Ok(())
    }
}

/// A byte-range query against one object's metadata tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    pub object_id: ObjectId,
    pub version: u32,
    pub offset: u64,
    pub size: u64,
}

impl<R: Read> ReadType<R> for Query {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            object_id: ObjectId(u32::read(reader)?),
            version: u32::read(reader)?,
            offset: u64::read(reader)?,
            size: u64::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for Query {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.object_id.0.write(writer)?;
        self.version.write(writer)?;
        self.offset.write(writer)?;
        self.size.write(writer)?;
        Ok(())
    }
}

/// One committed interval returned by `VMGR_GETTICKET`: the query range
/// as accepted (and possibly relocated, for `append`) by the version
/// manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub range: Query,
}

/// Reply to `VMGR_GETTICKET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmgrReply {
    pub intervals: Vec<Interval>,
}

impl VmgrReply {
    /// The chosen committed range: the last interval, per the write
    /// pipeline's contract.
    pub fn committed_range(&self) -> Option<Query> {
        self.intervals.last().map(|i| i.range)
    }
}

impl<R: Read> ReadType<R> for VmgrReply {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = u32::read(reader)? as usize;
        let mut intervals = Vec::with_capacity(len);
        for _ in 0..len {
            intervals.push(Interval {
                range: Query::read(reader)?,
            });
        }
        Ok(Self { intervals })
    }
}

impl<W: Write> WriteType<W> for VmgrReply {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        (self.intervals.len() as u32).write(writer)?;
        for interval in &self.intervals {
            interval.range.write(writer)?;
        }
        Ok(())
    }
}

/// One `(replica, page_offset, page_size)` tuple as returned by
/// `get_locations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub provider: ProviderDesc,
    pub page_offset: u64,
    pub page_size: u64,
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn page_key_of_is_deterministic_and_content_addressed() {
        let a = PageKey::of(b"hello world");
        let b = PageKey::of(b"hello world");
        let c = PageKey::of(b"goodbye world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn provider_desc_empty_sentinel() {
        assert!(ProviderDesc::empty().is_empty());
        assert!(!ProviderDesc::new("host", "1234").is_empty());
    }

    #[test]
    fn root_roundtrip() {
        let root = Root {
            object_id: ObjectId(7),
            version: 3,
            total_size: 4096 * 10,
            page_size: 4096,
            replica_count: 3,
        };
        let mut buf = Vec::new();
        root.write(&mut buf).unwrap();
        let decoded = Root::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(root, decoded);
    }

    #[test]
    fn vmgr_reply_committed_range_is_last_interval() {
        let reply = VmgrReply {
            intervals: vec![
                Interval {
                    range: Query {
                        object_id: ObjectId(1),
                        version: 1,
                        offset: 0,
                        size: 4096,
                    },
                },
                Interval {
                    range: Query {
                        object_id: ObjectId(1),
                        version: 2,
                        offset: 4096,
                        size: 4096,
                    },
                },
            ],
        };
        assert_eq!(reply.committed_range().unwrap().version, 2);
    }
}
