//! Address translators for `VirtualView`.
//!
//! - `LinearTranslator`: a fixed table of virtual -> physical regions
//! - `X64PageTable`: 4-level x86-64 page table walk rooted at a DTB

use super::virt::VirtualTranslate;
use super::MemoryView;
use crate::error::{MemError, Result};
use crate::types::{check_page_size, Address};

/// One contiguous mapping of `size` bytes from `virt` to `phys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub virt: Address,
    pub size: u64,
    pub phys: Address,
}

impl Region {
    fn contains(&self, address: Address) -> bool {
        address >= self.virt && address.as_u64() - self.virt.as_u64() < self.size
    }
}

/// Translation through a sorted table of regions.
#[derive(Debug, Clone)]
pub struct LinearTranslator {
    page_size: u64,
    regions: Vec<Region>,
}

impl LinearTranslator {
    /// Empty table splitting requests at `page_size`, which must be a power
    /// of two.
    pub fn new(page_size: u64) -> Result<Self> {
        check_page_size(page_size)?;
        Ok(Self {
            page_size,
            regions: Vec::new(),
        })
    }

    /// Add a mapping. Regions are kept sorted by virtual start; callers must
    /// not add overlapping regions.
    pub fn with_region(mut self, virt: Address, size: u64, phys: Address) -> Self {
        let region = Region { virt, size, phys };
        let at = self.regions.partition_point(|r| r.virt < virt);
        self.regions.insert(at, region);
        self
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

impl VirtualTranslate for LinearTranslator {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn translate(&self, _phys: &dyn MemoryView, address: Address) -> Result<Address> {
        let idx = self.regions.partition_point(|r| r.virt <= address);
        idx.checked_sub(1)
            .map(|i| &self.regions[i])
            .filter(|r| r.contains(address))
            .map(|r| r.phys + (address.as_u64() - r.virt.as_u64()))
            .ok_or(MemError::Translation { address })
    }
}

const PRESENT: u64 = 1;
const LARGE_PAGE: u64 = 1 << 7;
const ENTRY_ADDR_MASK: u64 = 0x000f_ffff_ffff_f000;
const HUGE_1G_MASK: u64 = 0x000f_ffff_c000_0000;
const HUGE_2M_MASK: u64 = 0x000f_ffff_ffe0_0000;

/// x86-64 long-mode page table (PML4 -> PDPT -> PD -> PT).
///
/// Supports 1 GiB and 2 MiB large pages. Only the present and page-size
/// bits are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct X64PageTable {
    dtb: Address,
}

impl X64PageTable {
    pub fn new(dtb: Address) -> Self {
        Self { dtb }
    }

    pub fn dtb(&self) -> Address {
        self.dtb
    }

    fn entry(
        phys: &dyn MemoryView,
        table: u64,
        index: u64,
        address: Address,
    ) -> Result<u64> {
        let entry = phys
            .read_u64(Address::new((table & ENTRY_ADDR_MASK) + index * 8))
            .map_err(|_| MemError::Translation { address })?;
        if entry & PRESENT == 0 {
            return Err(MemError::Translation { address });
        }
        Ok(entry)
    }
}

impl VirtualTranslate for X64PageTable {
    fn page_size(&self) -> u64 {
        0x1000
    }

    fn translate(&self, phys: &dyn MemoryView, address: Address) -> Result<Address> {
        let va = address.as_u64();
        let pml4e = Self::entry(phys, self.dtb.as_u64(), address.bit_range(39, 47), address)?;
        let pdpte = Self::entry(phys, pml4e, address.bit_range(30, 38), address)?;
        if pdpte & LARGE_PAGE != 0 {
            return Ok(Address::new((pdpte & HUGE_1G_MASK) | (va & 0x3fff_ffff)));
        }
        let pde = Self::entry(phys, pdpte, address.bit_range(21, 29), address)?;
        if pde & LARGE_PAGE != 0 {
            return Ok(Address::new((pde & HUGE_2M_MASK) | (va & 0x1f_ffff)));
        }
        let pte = Self::entry(phys, pde, address.bit_range(12, 20), address)?;
        Ok(Address::new((pte & ENTRY_ADDR_MASK) | (va & 0xfff)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::dummy::DummyMemory;
    use crate::connector::ConnectorInstance;

    fn phys(size: usize) -> crate::connector::PhysicalView {
        ConnectorInstance::from_backend("dummy", Box::new(DummyMemory::with_size(size as u64)))
            .physical_view()
    }

    #[test]
    fn linear_lookup() {
        let mem = phys(0x1000);
        let tr = LinearTranslator::new(0x1000)
            .unwrap()
            .with_region(Address::new(0x40_0000), 0x2000, Address::new(0x8000))
            .with_region(Address::new(0x10_0000), 0x1000, Address::new(0x0));

        assert_eq!(
            tr.translate(&mem, Address::new(0x40_1234)).unwrap(),
            Address::new(0x9234)
        );
        assert_eq!(
            tr.translate(&mem, Address::new(0x10_0010)).unwrap(),
            Address::new(0x10)
        );
        assert!(tr.translate(&mem, Address::new(0x40_2000)).is_err());
        assert!(tr.translate(&mem, Address::new(0x0)).is_err());
        assert_eq!(tr.regions()[0].virt, Address::new(0x10_0000));
    }

    #[test]
    fn linear_rejects_bad_page_size() {
        assert!(matches!(LinearTranslator::new(0), Err(MemError::InvalidArgs(_))));
        assert!(matches!(LinearTranslator::new(0x1001), Err(MemError::InvalidArgs(_))));
    }

    /// Build a page table in dummy memory:
    /// - PML4 at 0x1000, PDPT at 0x2000, PD at 0x3000, PT at 0x4000
    /// - VA 0x7f_0000_1000 -> PA 0x9000 (4 KiB page)
    /// - VA 0x7f_0020_0000 -> PA 0x20_0000 (2 MiB page)
    fn build_tables(mem: &crate::connector::PhysicalView) -> u64 {
        let va4k = 0x7f_0000_1000u64;
        let pml4_idx = (va4k >> 39) & 0x1ff;
        let pdpt_idx = (va4k >> 30) & 0x1ff;
        let pd_idx = (va4k >> 21) & 0x1ff;
        let pt_idx = (va4k >> 12) & 0x1ff;

        let w = |addr: u64, val: u64| {
            mem.write_raw(Address::new(addr), &val.to_le_bytes()).unwrap();
        };
        w(0x1000 + pml4_idx * 8, 0x2000 | PRESENT);
        w(0x2000 + pdpt_idx * 8, 0x3000 | PRESENT);
        w(0x3000 + pd_idx * 8, 0x4000 | PRESENT);
        w(0x4000 + pt_idx * 8, 0x9000 | PRESENT);
        // next PD entry maps a 2 MiB page
        w(0x3000 + (pd_idx + 1) * 8, 0x20_0000 | PRESENT | LARGE_PAGE);
        0x1000
    }

    #[test]
    fn x64_walk_4k_and_2m_pages() {
        let mem = phys(0x40_0000);
        let dtb = build_tables(&mem);
        let tr = X64PageTable::new(Address::new(dtb));

        assert_eq!(
            tr.translate(&mem, Address::new(0x7f_0000_1abc)).unwrap(),
            Address::new(0x9abc)
        );
        assert_eq!(
            tr.translate(&mem, Address::new(0x7f_0021_2345)).unwrap(),
            Address::new(0x21_2345)
        );
    }

    #[test]
    fn x64_walk_not_present() {
        let mem = phys(0x40_0000);
        let dtb = build_tables(&mem);
        let tr = X64PageTable::new(Address::new(dtb));
        let err = tr.translate(&mem, Address::new(0x7f_0000_2000)).unwrap_err();
        assert!(matches!(err, MemError::Translation { .. }));
        let err = tr.translate(&mem, Address::new(0x1000)).unwrap_err();
        assert!(matches!(err, MemError::Translation { .. }));
    }
}
