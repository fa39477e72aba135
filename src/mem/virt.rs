//! Virtual-address views layered over a physical view.
//!
//! Requests are split at page boundaries, each page is translated, and all
//! pieces of all entries go to the physical view as ONE batch. Piece outcomes
//! are folded back so the caller still gets one status per entry.

use super::{BatchStatus, MemoryView, PhysicalMemoryMetadata, ReadData, WriteData};
use crate::error::{MemError, Result};
use crate::types::{page_chunks, Address};
use tracing::trace;

/// Translates virtual addresses to physical ones.
pub trait VirtualTranslate: Send + Sync {
    /// Granularity of the mapping; requests are split at this boundary.
    fn page_size(&self) -> u64;

    /// Physical address backing `address`, reading translation structures
    /// through `phys` where needed.
    fn translate(&self, phys: &dyn MemoryView, address: Address) -> Result<Address>;
}

/// A view of a virtual address space.
pub struct VirtualView<M, T> {
    phys: M,
    translator: T,
}

impl<M: MemoryView, T: VirtualTranslate> VirtualView<M, T> {
    pub fn new(phys: M, translator: T) -> Self {
        Self { phys, translator }
    }

    pub fn phys(&self) -> &M {
        &self.phys
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// Translate a single virtual address.
    pub fn virt_to_phys(&self, address: Address) -> Result<Address> {
        self.translator.translate(&self.phys, address)
    }

    /// Physical address of every page-bounded piece of a request, or the
    /// first translation error.
    fn translate_span(&self, address: Address, len: usize) -> Result<Vec<(Address, usize)>> {
        if !address.span_fits(len) {
            return Err(MemError::OutOfRange { address, len });
        }
        page_chunks(address, len, self.translator.page_size())
            .map(|chunk| {
                self.translator
                    .translate(&self.phys, chunk.address)
                    .map(|pa| (pa, chunk.len))
            })
            .collect()
    }

    pub fn into_inner(self) -> (M, T) {
        (self.phys, self.translator)
    }
}

impl<M: MemoryView, T: VirtualTranslate> MemoryView for VirtualView<M, T> {
    fn read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        let entries = data.len();
        let mut status = BatchStatus::all_ok(entries);
        let mut owners = Vec::with_capacity(entries);
        let mut pieces = Vec::with_capacity(entries);

        for (idx, entry) in data.iter_mut().enumerate() {
            let spans = match self.translate_span(entry.address, entry.buf.len()) {
                Ok(spans) => spans,
                Err(e) => {
                    status.fail(idx, e);
                    continue;
                }
            };
            let mut rest: &mut [u8] = &mut *entry.buf;
            for (pa, len) in spans {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
                rest = tail;
                pieces.push(ReadData::new(pa, head));
                owners.push(idx);
            }
        }

        trace!(entries, pieces = pieces.len(), "virtual read batch");

        let piece_status = self.phys.read_raw_list(&mut pieces);
        for (owner, outcome) in owners.into_iter().zip(piece_status) {
            if let Err(e) = outcome {
                status.fail(owner, e);
            }
        }
        status
    }

    fn write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        let mut status = BatchStatus::all_ok(data.len());
        let mut owners = Vec::with_capacity(data.len());
        let mut pieces = Vec::with_capacity(data.len());

        for (idx, entry) in data.iter().enumerate() {
            let spans = match self.translate_span(entry.address, entry.buf.len()) {
                Ok(spans) => spans,
                Err(e) => {
                    status.fail(idx, e);
                    continue;
                }
            };
            let mut rest = entry.buf;
            for (pa, len) in spans {
                let (head, tail) = rest.split_at(len);
                rest = tail;
                pieces.push(WriteData::new(pa, head));
                owners.push(idx);
            }
        }

        trace!(entries = data.len(), pieces = pieces.len(), "virtual write batch");

        let piece_status = self.phys.write_raw_list(&pieces);
        for (owner, outcome) in owners.into_iter().zip(piece_status) {
            if let Err(e) = outcome {
                status.fail(owner, e);
            }
        }
        status
    }

    /// Physical metadata; the virtual space itself has no fixed size.
    fn metadata(&self) -> PhysicalMemoryMetadata {
        self.phys.metadata()
    }
}
