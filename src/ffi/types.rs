//! `#[repr(C)]` structures shared with C callers.

use crate::error::ResultCode;
use crate::mem::{PhysicalMemoryMetadata, ReadData, WriteData};
use std::slice;

/// One scatter-read entry as laid out by C callers.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ReadDataRaw {
    pub address: u64,
    pub buf: *mut u8,
    pub len: usize,
}

impl ReadDataRaw {
    /// Borrow the caller's buffer.
    ///
    /// # Safety
    /// `buf` must be valid for writes of `len` bytes for `'a` and must not
    /// overlap any other buffer borrowed at the same time.
    pub unsafe fn as_read_data<'a>(&self) -> Result<ReadData<'a>, ResultCode> {
        if self.len == 0 {
            return Ok(ReadData::new(self.address, &mut []));
        }
        if self.buf.is_null() {
            return Err(ResultCode::NullPointer);
        }
        Ok(ReadData::new(
            self.address,
            slice::from_raw_parts_mut(self.buf, self.len),
        ))
    }
}

/// One gather-write entry as laid out by C callers.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WriteDataRaw {
    pub address: u64,
    pub buf: *const u8,
    pub len: usize,
}

impl WriteDataRaw {
    /// # Safety
    /// `buf` must be valid for reads of `len` bytes for `'a`.
    pub unsafe fn as_write_data<'a>(&self) -> Result<WriteData<'a>, ResultCode> {
        if self.len == 0 {
            return Ok(WriteData::new(self.address, &[]));
        }
        if self.buf.is_null() {
            return Err(ResultCode::NullPointer);
        }
        Ok(WriteData::new(
            self.address,
            slice::from_raw_parts(self.buf, self.len),
        ))
    }
}

/// Connector metadata for C callers.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataRaw {
    pub size: u64,
    /// 1 when the connector rejects writes.
    pub readonly: u8,
    /// `ConnectorFeatures` bits.
    pub features: u32,
}

impl From<PhysicalMemoryMetadata> for MetadataRaw {
    fn from(meta: PhysicalMemoryMetadata) -> Self {
        Self {
            size: meta.size,
            readonly: meta.readonly as u8,
            features: meta.features.bits(),
        }
    }
}
