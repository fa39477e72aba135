//! Built-in connector backends and their discovery source.
//!
//! - `dummy`: zero-initialised in-memory address space
//! - `file`: memory dump file, mapped copy-on-write

pub mod dummy;
pub mod file;

use crate::config::MemConfig;
use crate::connector::{BackendDescriptor, BackendRegistry, Discovery, RegistryBuilder};
use crate::error::{MemError, Result};
use crate::mem::phys::{span_in, Access};
use crate::mem::{BatchStatus, PhysicalMemory, ReadData, WriteData};
use crate::types::Address;
use rayon::prelude::*;

/// Discovery source yielding the built-in backends.
#[derive(Debug, Clone, Default)]
pub struct Builtin {
    config: MemConfig,
}

impl Builtin {
    pub fn new(config: MemConfig) -> Self {
        Self { config }
    }
}

impl Discovery for Builtin {
    fn enumerate(&self) -> Vec<BackendDescriptor> {
        builtin(&self.config)
    }
}

/// Descriptors of every built-in backend, configured by `config`.
pub fn builtin(config: &MemConfig) -> Vec<BackendDescriptor> {
    let io = config.io.clone();
    let dummy_io = io.clone();
    vec![
        BackendDescriptor::new(
            "dummy",
            "zero-initialised in-memory address space",
            move |args| {
                dummy::DummyMemory::from_args(args, &dummy_io)
                    .map(|m| Box::new(m) as Box<dyn PhysicalMemory>)
            },
        ),
        BackendDescriptor::new("file", "memory dump file (copy-on-write)", move |args| {
            file::FileMemory::from_args(args, &io).map(|m| Box::new(m) as Box<dyn PhysicalMemory>)
        }),
    ]
}

/// Registry holding only the built-in backends.
pub fn builtin_registry(config: &MemConfig) -> BackendRegistry {
    let mut builder = RegistryBuilder::new();
    builder.discover(&Builtin::new(config.clone()));
    builder.build()
}

/// Translate `address` into an offset of a region starting at `base`.
fn rebase(address: Address, base: u64, len: usize) -> Result<Address> {
    address
        .as_u64()
        .checked_sub(base)
        .map(Address::new)
        .ok_or(MemError::OutOfRange { address, len })
}

fn read_one(mem: &[u8], base: u64, entry: &mut ReadData<'_>) -> Result<()> {
    if entry.buf.is_empty() {
        return Ok(());
    }
    let len = entry.buf.len();
    let local = rebase(entry.address, base, len)?;
    let range = span_in(local, len, mem.len() as u64, Access::Read).map_err(|e| {
        restore_address(e, entry.address)
    })?;
    entry.buf.copy_from_slice(&mem[range]);
    Ok(())
}

fn write_one(mem: &mut [u8], base: u64, entry: &WriteData<'_>) -> Result<()> {
    if entry.buf.is_empty() {
        return Ok(());
    }
    let len = entry.buf.len();
    let local = rebase(entry.address, base, len)?;
    let range = span_in(local, len, mem.len() as u64, Access::Write).map_err(|e| {
        restore_address(e, entry.address)
    })?;
    mem[range].copy_from_slice(entry.buf);
    Ok(())
}

/// Errors report the caller's address, not the rebased one.
fn restore_address(err: MemError, original: Address) -> MemError {
    match err {
        MemError::OutOfRange { len, .. } => MemError::OutOfRange {
            address: original,
            len,
        },
        MemError::PartialRead {
            requested,
            available,
            ..
        } => MemError::PartialRead {
            address: original,
            requested,
            available,
        },
        MemError::PartialWrite {
            requested,
            available,
            ..
        } => MemError::PartialWrite {
            address: original,
            requested,
            available,
        },
        other => other,
    }
}

/// Serve a read batch from a byte slice mapped at `base`.
///
/// Batches of at least `parallel_threshold` entries are copied on the rayon
/// pool.
pub(crate) fn read_batch(
    mem: &[u8],
    base: u64,
    data: &mut [ReadData<'_>],
    parallel_threshold: usize,
) -> BatchStatus {
    if data.len() >= parallel_threshold.max(1) {
        data.par_iter_mut()
            .map(|entry| read_one(mem, base, entry))
            .collect::<Vec<_>>()
            .into()
    } else {
        data.iter_mut()
            .map(|entry| read_one(mem, base, entry))
            .collect()
    }
}

/// Apply a write batch to a byte slice mapped at `base`, in entry order.
pub(crate) fn write_batch(mem: &mut [u8], base: u64, data: &[WriteData<'_>]) -> BatchStatus {
    data.iter().map(|entry| write_one(mem, base, entry)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_both() {
        let registry = builtin_registry(&MemConfig::default());
        assert_eq!(registry.names(), vec!["dummy", "file"]);
    }

    #[test]
    fn read_batch_reports_caller_addresses() {
        let mem = vec![7u8; 0x100];
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let mut c = [0u8; 0];
        let mut data = [
            ReadData::new(0x1000u64, &mut a),
            ReadData::new(0x10feu64, &mut b),
            ReadData::new(0x10u64, &mut c),
        ];
        let status = read_batch(&mem, 0x1000, &mut data, 64);
        assert!(status.get(0).unwrap().is_ok());
        assert!(matches!(
            status.get(1),
            Some(Err(MemError::PartialRead { address, available: 2, .. })) if *address == Address::new(0x10fe)
        ));
        assert!(status.get(2).unwrap().is_ok());
        assert_eq!(a, [7; 4]);
        assert_eq!(b, [0; 4]);
    }

    #[test]
    fn below_base_is_out_of_range() {
        let mem = vec![0u8; 0x100];
        let mut a = [0u8; 1];
        let mut data = [ReadData::new(0xfffu64, &mut a)];
        let status = read_batch(&mem, 0x1000, &mut data, 64);
        assert!(matches!(status.get(0), Some(Err(MemError::OutOfRange { .. }))));
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let mem: Vec<u8> = (0..=255u8).cycle().take(0x1000).collect();
        let mut seq_bufs = vec![[0u8; 16]; 100];
        let mut par_bufs = vec![[0u8; 16]; 100];

        let mut seq: Vec<_> = seq_bufs
            .iter_mut()
            .enumerate()
            .map(|(i, b)| ReadData::new(i as u64 * 40, &mut b[..]))
            .collect();
        let mut par: Vec<_> = par_bufs
            .iter_mut()
            .enumerate()
            .map(|(i, b)| ReadData::new(i as u64 * 40, &mut b[..]))
            .collect();

        let s1 = read_batch(&mem, 0, &mut seq, usize::MAX);
        let s2 = read_batch(&mem, 0, &mut par, 1);
        assert_eq!(s1.failed(), s2.failed());
        drop(seq);
        drop(par);
        assert_eq!(seq_bufs, par_bufs);
    }

    #[test]
    fn overlapping_writes_apply_in_order() {
        let mut mem = vec![0u8; 0x10];
        let data = [
            WriteData::new(0u64, &[1, 1, 1, 1]),
            WriteData::new(2u64, &[2, 2]),
        ];
        assert!(write_batch(&mut mem, 0, &data).is_ok());
        assert_eq!(&mem[..4], &[1, 1, 2, 2]);
    }
}
