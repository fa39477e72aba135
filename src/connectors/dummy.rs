//! In-memory backend, mostly for tests and demos.

use super::{read_batch, write_batch};
use crate::config::IoConfig;
use crate::connector::{ConnectorArgs, CpuState};
use crate::error::{MemError, Result};
use crate::mem::{
    BatchStatus, ConnectorFeatures, PhysicalMemory, PhysicalMemoryMetadata, ReadData, WriteData,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Simulated CPU of the dummy target. Only the run state is tracked;
/// memory stays accessible while paused.
#[derive(Debug, Default)]
pub struct DummyCpu {
    paused: AtomicBool,
}

impl CpuState for DummyCpu {
    fn pause(&self) -> Result<()> {
        if !self.paused.swap(true, Ordering::SeqCst) {
            debug!("dummy cpu paused");
        }
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        if self.paused.swap(false, Ordering::SeqCst) {
            debug!("dummy cpu resumed");
        }
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// A zero-initialised physical address space held in a `Vec<u8>`.
#[derive(Debug)]
pub struct DummyMemory {
    mem: RwLock<Vec<u8>>,
    cpu: DummyCpu,
    parallel_threshold: usize,
}

impl DummyMemory {
    pub fn with_size(size: u64) -> Self {
        Self::from_bytes(vec![0u8; size as usize])
    }

    /// Use `bytes` as the initial contents; the address space is as large as
    /// the buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            mem: RwLock::new(bytes),
            cpu: DummyCpu::default(),
            parallel_threshold: IoConfig::default().parallel_threshold,
        }
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Build from an argument string: the positional value or `size=`
    /// gives the size, otherwise `io.default_dummy_size`.
    pub fn from_args(args: &str, io: &IoConfig) -> Result<Self> {
        let args = ConnectorArgs::parse(args)?;
        let size = args.parse_u64("size")?.unwrap_or(io.default_dummy_size);
        if size == 0 {
            return Err(MemError::BackendInit {
                backend: "dummy".into(),
                message: "size must be non-zero".into(),
            });
        }
        if size > io.max_dump_size {
            return Err(MemError::BackendInit {
                backend: "dummy".into(),
                message: format!("size {size:#x} exceeds limit {:#x}", io.max_dump_size),
            });
        }
        let len = usize::try_from(size).map_err(|_| MemError::AllocationFailure {
            bytes: usize::MAX,
        })?;
        let bytes = crate::mem::try_alloc_zeroed(len)?;
        debug!(size = format_args!("{size:#x}"), "dummy memory allocated");
        Ok(Self::from_bytes(bytes).with_parallel_threshold(io.parallel_threshold))
    }
}

impl PhysicalMemory for DummyMemory {
    fn phys_read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        let mem = self.mem.read().unwrap_or_else(PoisonError::into_inner);
        read_batch(&mem, 0, data, self.parallel_threshold)
    }

    fn phys_write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        let mut mem = self.mem.write().unwrap_or_else(PoisonError::into_inner);
        write_batch(&mut mem, 0, data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        let size = self.mem.read().unwrap_or_else(PoisonError::into_inner).len();
        PhysicalMemoryMetadata::new(size as u64, false).with_features(ConnectorFeatures::CPU_STATE)
    }

    fn cpu_state(&self) -> Option<&dyn CpuState> {
        Some(&self.cpu)
    }
}
