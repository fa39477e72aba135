//! The capability contract every connector backend implements.

use super::{BatchStatus, ReadData, WriteData};
use crate::connector::CpuState;
use crate::error::{MemError, Result};
use crate::types::Address;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::ops::Range;

bitflags! {
    /// Operations a connector supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ConnectorFeatures: u32 {
        const READ = 1;
        const WRITE = 1 << 1;
        const METADATA = 1 << 2;
        /// The target's CPUs can be paused and resumed.
        const CPU_STATE = 1 << 3;
    }
}

/// Describes the physical address space exposed by a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalMemoryMetadata {
    /// Number of addressable bytes, starting at the connector's base.
    pub size: u64,
    pub readonly: bool,
    pub features: ConnectorFeatures,
}

impl PhysicalMemoryMetadata {
    pub fn new(size: u64, readonly: bool) -> Self {
        let mut features = ConnectorFeatures::READ | ConnectorFeatures::METADATA;
        if !readonly {
            features |= ConnectorFeatures::WRITE;
        }
        Self {
            size,
            readonly,
            features,
        }
    }

    pub fn with_features(mut self, features: ConnectorFeatures) -> Self {
        self.features |= features;
        self
    }
}

/// Backend side of a connector: raw physical reads and writes.
///
/// Methods take `&self` because clones of one connector may be used from
/// several threads at once; backends serialize access to their underlying
/// resource themselves. Teardown is the backend's `Drop`.
pub trait PhysicalMemory: Send + Sync {
    fn phys_read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus;

    fn phys_write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus;

    fn metadata(&self) -> PhysicalMemoryMetadata;

    /// CPU control of the target, for backends attached to a live machine.
    fn cpu_state(&self) -> Option<&dyn CpuState> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Resolve `address..address+len` against an address space of `size` bytes
/// starting at zero.
///
/// A start at or past the end is `OutOfRange`; a span that starts inside but
/// runs past the end is `PartialRead` / `PartialWrite`.
pub fn span_in(address: Address, len: usize, size: u64, access: Access) -> Result<Range<usize>> {
    let start = address.as_u64();
    if start >= size {
        return Err(MemError::OutOfRange { address, len });
    }
    let available = size - start;
    if len as u64 > available {
        let available = available as usize;
        return Err(match access {
            Access::Read => MemError::PartialRead {
                address,
                requested: len,
                available,
            },
            Access::Write => MemError::PartialWrite {
                address,
                requested: len,
                available,
            },
        });
    }
    let start = start as usize;
    Ok(start..start + len)
}
