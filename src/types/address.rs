//! Address type used for every physical and virtual location.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// A 64-bit address in either a physical or a virtual address space.
///
/// The type does not record which space it belongs to; that is decided by
/// the view the address is handed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct Address(u64);

impl Address {
    /// The zero address.
    pub const NULL: Address = Address(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn null() -> Self {
        Self::NULL
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Address `len` bytes further, or `None` on overflow.
    pub fn checked_add(self, len: u64) -> Option<Address> {
        self.0.checked_add(len).map(Address)
    }

    /// Whether `len` bytes starting here fit below the top of the 64-bit
    /// space. A span may end exactly at `u64::MAX`.
    pub fn span_fits(self, len: usize) -> bool {
        len == 0 || self.0.checked_add(len as u64 - 1).is_some()
    }

    /// Round down to the start of the page containing this address.
    ///
    /// `page_size` must be a power of two.
    pub const fn page_align_down(self, page_size: u64) -> Address {
        Address(self.0 & !(page_size - 1))
    }

    /// Offset of this address inside its page.
    pub const fn page_offset(self, page_size: u64) -> u64 {
        self.0 & (page_size - 1)
    }

    /// Extract the bit range `lo..=hi` shifted down to bit zero.
    pub const fn bit_range(self, lo: u32, hi: u32) -> u64 {
        let width = hi - lo + 1;
        if width >= 64 {
            self.0 >> lo
        } else {
            (self.0 >> lo) & ((1u64 << width) - 1)
        }
    }
}

/// Wrapping addition; address arithmetic never panics.
impl Add<u64> for Address {
    type Output = Address;

    fn add(self, rhs: u64) -> Address {
        Address(self.0.wrapping_add(rhs))
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Address> for u64 {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
