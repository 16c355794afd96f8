//! Wire primitives for the RPC frame format.
//!
//! Every fixed-width integer is big-endian. A [`bytes::Bytes`] blob is
//! written as a `u32` length prefix followed by the raw bytes, matching
//! the parameter-blob shape described for RPC frames.

use std::io::{Read, Write};

use bytes::Bytes;

use super::traits::{ReadError, ReadType, WriteError, WriteType};

impl<R: Read> ReadType<R> for bool {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

impl<W: Write> WriteType<W> for bool {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&[*self as u8])?;
        Ok(())
    }
}

macro_rules! impl_fixed_width {
    ($t:ty, $size:expr) => {
        impl<R: Read> ReadType<R> for $t {
            fn read(reader: &mut R) -> Result<Self, ReadError> {
                let mut buf = [0u8; $size];
                reader.read_exact(&mut buf)?;
                Ok(<$t>::from_be_bytes(buf))
            }
        }

        impl<W: Write> WriteType<W> for $t {
            fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                writer.write_all(&self.to_be_bytes())?;
                Ok(())
            }
        }
    };
}

impl_fixed_width!(i32, 4);
impl_fixed_width!(u32, 4);
impl_fixed_width!(i64, 8);
impl_fixed_width!(u64, 8);

/// A length-prefixed opaque parameter blob: `{length: u32, bytes[length]}`.
impl<R: Read> ReadType<R> for Bytes {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = u32::read(reader)? as usize;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

impl<W: Write> WriteType<W> for Bytes {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let len: u32 = self
            .len()
            .try_into()
            .map_err(|_| WriteError::TooLarge(self.len()))?;
        len.write(writer)?;
        writer.write_all(self)?;
        Ok(())
    }
}

/// A length-prefixed UTF-8 string, reusing the `Bytes` framing.
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let bytes = Bytes::read(reader)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ReadError::Malformed(format!("invalid UTF-8 string: {e}")))
    }
}

impl<W: Write> WriteType<W> for String {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        Bytes::copy_from_slice(self.as_bytes()).write(writer)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn roundtrip<T>(value: T)
    where
        T: WriteType<Vec<u8>> + ReadType<Cursor<Vec<u8>>> + PartialEq + std::fmt::Debug,
    {
        let mut buf = Vec::new();
        value.write(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = T::read(&mut cursor).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn roundtrip_ints() {
        roundtrip(0i32);
        roundtrip(-42i32);
        roundtrip(i32::MAX);
        roundtrip(0u32);
        roundtrip(u32::MAX);
        roundtrip(0i64);
        roundtrip(i64::MIN);
        roundtrip(0u64);
        roundtrip(u64::MAX);
    }

    #[test]
    fn roundtrip_bool() {
        roundtrip(true);
        roundtrip(false);
    }

    #[test]
    fn roundtrip_bytes() {
        roundtrip(Bytes::from_static(b""));
        roundtrip(Bytes::from_static(b"hello world"));
    }
}
