//! Splitting address ranges at page boundaries.

use super::Address;
use crate::error::{MemError, Result};

/// One page-bounded piece of a larger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChunk {
    /// Address of the first byte of this piece.
    pub address: Address,
    /// Offset of this piece inside the caller's buffer.
    pub offset: usize,
    /// Length of this piece; never crosses a page boundary.
    pub len: usize,
}

/// Reject page sizes that cannot split requests: zero or not a power of
/// two.
pub fn check_page_size(page_size: u64) -> Result<()> {
    if page_size.is_power_of_two() {
        Ok(())
    } else {
        Err(MemError::InvalidArgs(format!(
            "page size {page_size:#x} is not a power of two"
        )))
    }
}

/// Iterator over the page-bounded pieces of `address..address+len`.
#[derive(Debug, Clone)]
pub struct PageChunks {
    address: Address,
    offset: usize,
    remaining: usize,
    page_size: u64,
}

/// Split `len` bytes starting at `address` into pieces that never cross a
/// `page_size` boundary. `page_size` must be a non-zero power of two.
pub fn page_chunks(address: Address, len: usize, page_size: u64) -> PageChunks {
    debug_assert!(page_size.is_power_of_two());
    PageChunks {
        address,
        offset: 0,
        remaining: len,
        page_size,
    }
}

impl Iterator for PageChunks {
    type Item = PageChunk;

    fn next(&mut self) -> Option<PageChunk> {
        if self.remaining == 0 {
            return None;
        }
        let to_boundary = self.page_size - self.address.page_offset(self.page_size);
        let len = (self.remaining as u64).min(to_boundary) as usize;
        let chunk = PageChunk {
            address: self.address,
            offset: self.offset,
            len,
        };
        self.address = self.address + len as u64;
        self.offset += len;
        self.remaining -= len;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.remaining == 0 {
            return (0, Some(0));
        }
        let first = self.page_size - self.address.page_offset(self.page_size);
        let rest = (self.remaining as u64).saturating_sub(first);
        let n = 1 + rest.div_ceil(self.page_size) as usize;
        (n, Some(n))
    }
}
