//! RPC wire format: frame header, parameter blobs and the name catalog.

pub mod catalog;
pub mod frame;
pub mod primitives;
pub mod traits;

pub use frame::{Frame, FrameHeader, Status};
pub use traits::{ReadError, ReadType, WriteError, WriteType};
