//! MemoryView: batched reads and writes against an address space.
//!
//! Every view answers scatter/gather batches (`read_raw_list`,
//! `write_raw_list`) and reports one outcome per entry, so a caller can tell
//! exactly which entries succeeded. Single-range calls and typed helpers are
//! provided on top of the batch primitives.

pub mod cache;
pub mod phys;
pub mod translate;
pub mod virt;

pub use phys::{ConnectorFeatures, PhysicalMemory, PhysicalMemoryMetadata};

use crate::error::{MemError, Result, ResultCode};
use crate::types::Address;
use bytes::Bytes;

/// One entry of a scatter read: fill `buf` from `address`.
#[derive(Debug)]
pub struct ReadData<'a> {
    pub address: Address,
    pub buf: &'a mut [u8],
}

impl<'a> ReadData<'a> {
    pub fn new(address: impl Into<Address>, buf: &'a mut [u8]) -> Self {
        Self {
            address: address.into(),
            buf,
        }
    }
}

/// One entry of a gather write: store `buf` at `address`.
#[derive(Debug, Clone, Copy)]
pub struct WriteData<'a> {
    pub address: Address,
    pub buf: &'a [u8],
}

impl<'a> WriteData<'a> {
    pub fn new(address: impl Into<Address>, buf: &'a [u8]) -> Self {
        Self {
            address: address.into(),
            buf,
        }
    }
}

/// Per-entry outcome of a batch, positionally matching the request.
#[derive(Debug, Default)]
pub struct BatchStatus(Vec<Result<()>>);

impl BatchStatus {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// A status of `len` successful entries.
    pub fn all_ok(len: usize) -> Self {
        Self((0..len).map(|_| Ok(())).collect())
    }

    pub fn push(&mut self, outcome: Result<()>) {
        self.0.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every entry succeeded.
    pub fn is_ok(&self) -> bool {
        self.0.iter().all(|r| r.is_ok())
    }

    pub fn get(&self, index: usize) -> Option<&Result<()>> {
        self.0.get(index)
    }

    /// Replace the outcome of one entry, unless it already failed.
    pub fn fail(&mut self, index: usize, err: MemError) {
        if let Some(slot) = self.0.get_mut(index) {
            if slot.is_ok() {
                *slot = Err(err);
            }
        }
    }

    /// Indices of the failed entries, in request order.
    pub fn failed(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_err().then_some(i))
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Result<()>> {
        self.0.iter()
    }

    /// Boundary code per entry.
    pub fn codes(&self) -> impl Iterator<Item = ResultCode> + '_ {
        self.0.iter().map(|r| match r {
            Ok(()) => ResultCode::Ok,
            Err(e) => e.code(),
        })
    }

    /// Collapse into the first error, if any.
    pub fn into_result(self) -> Result<()> {
        self.0.into_iter().find(|r| r.is_err()).unwrap_or(Ok(()))
    }

    pub fn into_inner(self) -> Vec<Result<()>> {
        self.0
    }
}

impl From<Vec<Result<()>>> for BatchStatus {
    fn from(outcomes: Vec<Result<()>>) -> Self {
        Self(outcomes)
    }
}

impl FromIterator<Result<()>> for BatchStatus {
    fn from_iter<I: IntoIterator<Item = Result<()>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for BatchStatus {
    type Item = Result<()>;
    type IntoIter = std::vec::IntoIter<Result<()>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Allocate a zeroed buffer, reporting failure instead of aborting.
pub fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| MemError::AllocationFailure { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Bounded, batched memory access.
///
/// Implementations must be safe to call from several threads at once; the
/// methods take `&self` and any serialization happens inside.
pub trait MemoryView: Send + Sync {
    /// Scatter read. Each entry's buffer is filled or its status is an error.
    fn read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus;

    /// Gather write. Overlapping entries apply in request order.
    fn write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus;

    /// Metadata of the address space behind this view.
    fn metadata(&self) -> PhysicalMemoryMetadata;

    /// Fill `out` from `address`. The whole span must be readable.
    fn read_raw_into(&self, address: Address, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }
        let mut data = [ReadData::new(address, out)];
        self.read_raw_list(&mut data).into_result()
    }

    /// Read `len` bytes into a fresh buffer.
    fn read_raw(&self, address: Address, len: usize) -> Result<Bytes> {
        let mut buf = try_alloc_zeroed(len)?;
        self.read_raw_into(address, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn write_raw(&self, address: Address, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.write_raw_list(&[WriteData::new(address, data)])
            .into_result()
    }

    fn read_u32(&self, address: Address) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_raw_into(address, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn read_u64(&self, address: Address) -> Result<u64> {
        let mut b = [0u8; 8];
        self.read_raw_into(address, &mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    /// Read a little-endian 64-bit pointer.
    fn read_addr64(&self, address: Address) -> Result<Address> {
        self.read_u64(address).map(Address::new)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes.
    ///
    /// A string that runs into the end of the address space is cut there.
    fn read_cstr(&self, address: Address, max_len: usize) -> Result<String> {
        let mut buf = try_alloc_zeroed(max_len)?;
        let len = match self.read_raw_into(address, &mut buf) {
            Ok(()) => max_len,
            Err(MemError::PartialRead { available, .. }) if available > 0 => {
                self.read_raw_into(address, &mut buf[..available])?;
                available
            }
            Err(e) => return Err(e),
        };
        let end = buf[..len].iter().position(|&b| b == 0).unwrap_or(len);
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

impl<T: MemoryView + ?Sized> MemoryView for &T {
    fn read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        (**self).read_raw_list(data)
    }

    fn write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        (**self).write_raw_list(data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        (**self).metadata()
    }
}

impl<T: MemoryView + ?Sized> MemoryView for Box<T> {
    fn read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        (**self).read_raw_list(data)
    }

    fn write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        (**self).write_raw_list(data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        (**self).metadata()
    }
}
