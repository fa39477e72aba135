//! Page cache in front of any view.
//!
//! Reads are served page-wise from the cache; missing pages are fetched in
//! one batch. Pages expire after a fixed validity period so live targets
//! are eventually re-read. Writes go straight through and drop every page
//! they touch.
//!
//! Fills read the inner view without holding the cache lock. Every write
//! bumps an epoch; a fill that raced a write discards what it read, so a
//! completed write is never hidden behind an older page.

use super::{try_alloc_zeroed, BatchStatus, MemoryView, PhysicalMemoryMetadata, ReadData, WriteData};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::types::{check_page_size, page_chunks, Address};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

struct CachedPage {
    data: Box<[u8]>,
    loaded: Instant,
}

#[derive(Default)]
struct CacheState {
    pages: HashMap<u64, CachedPage>,
    /// Bumped by every write and invalidation.
    epoch: u64,
}

/// A view that caches whole pages of the view it wraps.
pub struct CachedView<M> {
    mem: M,
    page_size: u64,
    capacity: usize,
    validity: Duration,
    state: Mutex<CacheState>,
}

impl<M: MemoryView> CachedView<M> {
    /// Cache whole pages of `page_size` bytes, which must be a power of two.
    pub fn new(mem: M, page_size: u64, config: &CacheConfig) -> Result<Self> {
        check_page_size(page_size)?;
        Ok(Self {
            mem,
            page_size,
            capacity: config.pages.max(1),
            validity: Duration::from_millis(config.validity_ms),
            state: Mutex::new(CacheState::default()),
        })
    }

    pub fn inner(&self) -> &M {
        &self.mem
    }

    /// Number of pages currently held, valid or not.
    pub fn cached_pages(&self) -> usize {
        self.lock().pages.len()
    }

    /// Drop every cached page.
    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        state.pages.clear();
        state.epoch = state.epoch.wrapping_add(1);
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn page_of(&self, address: Address) -> u64 {
        address.page_align_down(self.page_size).as_u64()
    }

    /// Copy an entry out of the cache if every page it touches is present
    /// and still valid.
    fn try_serve(
        &self,
        pages: &HashMap<u64, CachedPage>,
        address: Address,
        buf: &mut [u8],
    ) -> bool {
        // spans wrapping past the top of the space are answered by the inner view
        if !address.span_fits(buf.len()) {
            return false;
        }
        let now = Instant::now();
        let chunks: Vec<_> = page_chunks(address, buf.len(), self.page_size).collect();
        let all_valid = chunks.iter().all(|c| {
            pages
                .get(&self.page_of(c.address))
                .is_some_and(|p| now.duration_since(p.loaded) < self.validity)
        });
        if !all_valid {
            return false;
        }
        for c in chunks {
            if let Some(page) = pages.get(&self.page_of(c.address)) {
                let off = c.address.page_offset(self.page_size) as usize;
                buf[c.offset..c.offset + c.len].copy_from_slice(&page.data[off..off + c.len]);
            }
        }
        true
    }

    fn insert(&self, pages: &mut HashMap<u64, CachedPage>, page: u64, data: Box<[u8]>) {
        if pages.len() >= self.capacity && !pages.contains_key(&page) {
            let now = Instant::now();
            pages.retain(|_, p| now.duration_since(p.loaded) < self.validity);
            if pages.len() >= self.capacity {
                if let Some(oldest) = pages
                    .iter()
                    .min_by_key(|(_, p)| p.loaded)
                    .map(|(k, _)| *k)
                {
                    pages.remove(&oldest);
                }
            }
        }
        pages.insert(
            page,
            CachedPage {
                data,
                loaded: Instant::now(),
            },
        );
    }

    /// Fetch the given pages from the inner view in one batch and cache the
    /// ones that could be read in full.
    fn fill(&self, wanted: Vec<u64>) {
        let epoch = self.lock().epoch;
        let mut buffers = Vec::with_capacity(wanted.len());
        for _ in &wanted {
            match try_alloc_zeroed(self.page_size as usize) {
                Ok(buf) => buffers.push(buf),
                Err(_) => return,
            }
        }
        let mut data: Vec<ReadData<'_>> = wanted
            .iter()
            .zip(buffers.iter_mut())
            .map(|(page, buf)| ReadData::new(*page, buf.as_mut_slice()))
            .collect();
        let status = self.mem.read_raw_list(&mut data);
        drop(data);

        let mut state = self.lock();
        if state.epoch != epoch {
            trace!(pages = wanted.len(), "write raced cache fill, dropping pages");
            return;
        }
        for ((page, buf), outcome) in wanted.into_iter().zip(buffers).zip(status) {
            if outcome.is_ok() {
                self.insert(&mut state.pages, page, buf.into_boxed_slice());
            }
        }
    }
}

impl<M: MemoryView> MemoryView for CachedView<M> {
    fn read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        let mut status = BatchStatus::all_ok(data.len());

        let mut missed = Vec::new();
        {
            let state = self.lock();
            for (idx, entry) in data.iter_mut().enumerate() {
                if !self.try_serve(&state.pages, entry.address, entry.buf) {
                    missed.push(idx);
                }
            }
        }
        if missed.is_empty() {
            return status;
        }

        let mut wanted: Vec<u64> = missed
            .iter()
            .filter(|&&idx| data[idx].address.span_fits(data[idx].buf.len()))
            .flat_map(|&idx| {
                page_chunks(data[idx].address, data[idx].buf.len(), self.page_size)
                    .map(|c| self.page_of(c.address))
            })
            .collect();
        wanted.sort_unstable();
        wanted.dedup();
        trace!(
            missed = missed.len(),
            pages = wanted.len(),
            "cache miss, filling pages"
        );
        if !wanted.is_empty() {
            self.fill(wanted);
        }

        // whatever is still not servable (e.g. the last, partial page of the
        // address space) goes to the inner view directly so errors stay exact
        let mut direct = Vec::new();
        {
            let state = self.lock();
            for idx in missed {
                let entry = &mut data[idx];
                if !self.try_serve(&state.pages, entry.address, entry.buf) {
                    direct.push(idx);
                }
            }
        }
        if direct.is_empty() {
            return status;
        }

        let mut passthrough: Vec<ReadData<'_>> = Vec::with_capacity(direct.len());
        let mut rest: &mut [ReadData<'_>] = data;
        let mut consumed = 0;
        for &idx in &direct {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(idx - consumed + 1);
            consumed = idx + 1;
            rest = tail;
            if let Some(entry) = head.last_mut() {
                passthrough.push(ReadData::new(entry.address, &mut *entry.buf));
            }
        }
        let direct_status = self.mem.read_raw_list(&mut passthrough);
        for (idx, outcome) in direct.into_iter().zip(direct_status) {
            if let Err(e) = outcome {
                status.fail(idx, e);
            }
        }
        status
    }

    fn write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        let status = self.mem.write_raw_list(data);
        let mut state = self.lock();
        state.epoch = state.epoch.wrapping_add(1);
        for entry in data {
            for c in page_chunks(entry.address, entry.buf.len(), self.page_size) {
                state.pages.remove(&self.page_of(c.address));
            }
        }
        status
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        self.mem.metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorInstance, PhysicalView};
    use crate::connectors::dummy::DummyMemory;
    use crate::error::MemError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    fn cached(size: u64, validity_ms: u64) -> CachedView<PhysicalView> {
        let conn = ConnectorInstance::from_backend("dummy", Box::new(DummyMemory::with_size(size)));
        let cfg = CacheConfig {
            enabled: true,
            pages: 4,
            validity_ms,
        };
        CachedView::new(conn.physical_view(), 0x1000, &cfg).unwrap()
    }

    #[test]
    fn read_populates_cache() {
        let view = cached(0x8000, 60_000);
        view.inner().write_raw(Address::new(0x1ffe), &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        view.read_raw_into(Address::new(0x1ffe), &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(view.cached_pages(), 2);

        // bypassing the cache leaves a stale page behind until it expires
        view.inner().write_raw(Address::new(0x1ffe), &[9, 9]).unwrap();
        view.read_raw_into(Address::new(0x1ffe), &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        view.invalidate_all();
        view.read_raw_into(Address::new(0x1ffe), &mut buf).unwrap();
        assert_eq!(buf, [9, 9, 3, 4]);
    }

    #[test]
    fn writes_invalidate_touched_pages() {
        let view = cached(0x8000, 60_000);
        let mut buf = [0u8; 2];
        view.read_raw_into(Address::new(0x3000), &mut buf).unwrap();
        assert_eq!(view.cached_pages(), 1);

        view.write_raw(Address::new(0x3000), &[7, 8]).unwrap();
        assert_eq!(view.cached_pages(), 0);
        view.read_raw_into(Address::new(0x3000), &mut buf).unwrap();
        assert_eq!(buf, [7, 8]);
    }

    #[test]
    fn expired_pages_are_reloaded() {
        let view = cached(0x8000, 0);
        let mut buf = [0u8; 1];
        view.read_raw_into(Address::new(0x10), &mut buf).unwrap();
        view.inner().write_raw(Address::new(0x10), &[5]).unwrap();
        view.read_raw_into(Address::new(0x10), &mut buf).unwrap();
        assert_eq!(buf, [5]);
    }

    #[test]
    fn capacity_is_bounded() {
        let view = cached(0x8000, 60_000);
        let mut buf = [0u8; 1];
        for page in 0..8u64 {
            view.read_raw_into(Address::new(page * 0x1000), &mut buf).unwrap();
        }
        assert!(view.cached_pages() <= 4);
    }

    #[test]
    fn errors_pass_through_per_entry() {
        let view = cached(0x1800, 60_000);
        let mut a = [0u8; 4];
        let mut b = [0u8; 0x10];
        let mut c = [0u8; 4];
        let mut data = [
            ReadData::new(0x0u64, &mut a),
            ReadData::new(0x17f8u64, &mut b),
            ReadData::new(0x4000u64, &mut c),
        ];
        let status = view.read_raw_list(&mut data);
        assert!(status.get(0).unwrap().is_ok());
        assert!(matches!(status.get(1), Some(Err(MemError::PartialRead { .. }))));
        assert!(matches!(status.get(2), Some(Err(MemError::OutOfRange { .. }))));
    }

    #[test]
    fn rejects_bad_page_size() {
        let conn = ConnectorInstance::from_backend("dummy", Box::new(DummyMemory::with_size(0x1000)));
        let cfg = CacheConfig::default();
        assert!(matches!(
            CachedView::new(conn.physical_view(), 0, &cfg),
            Err(MemError::InvalidArgs(_))
        ));
        assert!(CachedView::new(conn.physical_view(), 0x1800, &cfg).is_err());
    }

    /// Parks the first read after it has copied its data until released.
    struct Gated {
        inner: PhysicalView,
        armed: AtomicBool,
        filled: Mutex<mpsc::Sender<()>>,
        resume: Mutex<mpsc::Receiver<()>>,
    }

    impl MemoryView for Gated {
        fn read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
            let status = self.inner.read_raw_list(data);
            if self.armed.swap(false, Ordering::SeqCst) {
                self.filled.lock().unwrap().send(()).unwrap();
                self.resume.lock().unwrap().recv().unwrap();
            }
            status
        }

        fn write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
            self.inner.write_raw_list(data)
        }

        fn metadata(&self) -> PhysicalMemoryMetadata {
            self.inner.metadata()
        }
    }

    #[test]
    fn write_during_fill_is_not_hidden() {
        let conn = ConnectorInstance::from_backend("dummy", Box::new(DummyMemory::with_size(0x4000)));
        let (filled_tx, filled_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let gated = Gated {
            inner: conn.physical_view(),
            armed: AtomicBool::new(true),
            filled: Mutex::new(filled_tx),
            resume: Mutex::new(resume_rx),
        };
        let cfg = CacheConfig {
            enabled: true,
            pages: 4,
            validity_ms: 60_000,
        };
        let view = CachedView::new(gated, 0x1000, &cfg).unwrap();

        std::thread::scope(|s| {
            let reader = s.spawn(|| {
                let mut buf = [0u8; 4];
                view.read_raw_into(Address::new(0x1000), &mut buf).unwrap();
            });
            // the fill has copied the old page but not cached it yet
            filled_rx.recv().unwrap();
            view.write_raw(Address::new(0x1000), &[9; 4]).unwrap();
            resume_tx.send(()).unwrap();
            reader.join().unwrap();
        });

        let mut buf = [0u8; 4];
        view.read_raw_into(Address::new(0x1000), &mut buf).unwrap();
        assert_eq!(buf, [9; 4]);
    }

    #[test]
    fn request_wrapping_the_space_is_not_served_from_page_zero() {
        let view = cached(0x2000, 60_000);
        let mut buf = [0u8; 4];
        view.read_raw_into(Address::new(0), &mut buf).unwrap();
        assert_eq!(view.cached_pages(), 1);

        let err = view
            .read_raw_into(Address::new(u64::MAX - 1), &mut buf)
            .unwrap_err();
        assert!(matches!(err, MemError::OutOfRange { .. }));
    }
}
