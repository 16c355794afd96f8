//! RPC frame header and status codes.
//!
//! Wire shape: `{name: u32, psize: u32, status: i32}` followed by `psize`
//! length-prefixed parameter blobs. Requests carry `status = Status::Ok`;
//! responses echo the request `name`.

use std::io::{Read, Write};

use bytes::Bytes;

use super::traits::{ReadError, ReadType, WriteError, WriteType};

/// Application-level status codes used across the RPC catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Status {
    Ok,
    /// Wrong argument count or malformed argument.
    EArg,
    /// Requested object was not found (or not all of them were).
    EObj,
    /// The operation could not be completed by the server.
    ERes,
    /// The call did not complete within its deadline.
    Timeout,
    /// The connection to the peer could not be established or was lost.
    ConnectionError,
}

impl Status {
    const OK: i32 = 0;
    const EOBJ: i32 = 6;
    const EARG: i32 = 7;
    const ERES: i32 = 28;
    // Transport-level codes have no wire representation; they never leave
    // this process, so any value outside the application range decodes to
    // a generic protocol failure.
    const UNKNOWN: i32 = -1;

    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn code(self) -> i32 {
        match self {
            Status::Ok => Self::OK,
            Status::EObj => Self::EOBJ,
            Status::EArg => Self::EARG,
            Status::ERes => Self::ERES,
            Status::Timeout | Status::ConnectionError => Self::UNKNOWN,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            Self::OK => Status::Ok,
            Self::EOBJ => Status::EObj,
            Self::EARG => Status::EArg,
            Self::ERES => Status::ERes,
            _ => Status::ConnectionError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub name: u32,
    pub psize: u32,
    pub status: i32,
}

impl<R: Read> ReadType<R> for FrameHeader {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            name: u32::read(reader)?,
            psize: u32::read(reader)?,
            status: i32::read(reader)?,
        })
    }
}

impl<W: Write> WriteType<W> for FrameHeader {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.name.write(writer)?;
        self.psize.write(writer)?;
        self.status.write(writer)?;
        Ok(())
    }
}

/// A full request or response: header plus its parameter blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub params: Vec<Bytes>,
}

impl Frame {
    pub fn request(name: u32, params: Vec<Bytes>) -> Self {
        Self {
            header: FrameHeader {
                name,
                psize: params.len() as u32,
                status: Status::Ok.code(),
            },
            params,
        }
    }

    pub fn response(name: u32, status: Status, params: Vec<Bytes>) -> Self {
        Self {
            header: FrameHeader {
                name,
                psize: params.len() as u32,
                status: status.code(),
            },
            params,
        }
    }

    pub fn status(&self) -> Status {
        Status::from_code(self.header.status)
    }
}

impl<R: Read> ReadType<R> for Frame {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let header = FrameHeader::read(reader)?;
        let mut params = Vec::with_capacity(header.psize as usize);
        for _ in 0..header.psize {
            params.push(Bytes::read(reader)?);
        }
        Ok(Self { header, params })
    }
}

impl<W: Write> WriteType<W> for Frame {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.header.write(writer)?;
        for param in &self.params {
            param.write(writer)?;
        }
        Ok(())
    }
}
