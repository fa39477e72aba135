//! Shared helpers for the integration tests.

#![allow(dead_code)]

use memgate::connector::{BackendDescriptor, BackendRegistry, RegistryBuilder};
use memgate::connectors::dummy::DummyMemory;
use memgate::mem::{BatchStatus, PhysicalMemory, PhysicalMemoryMetadata, ReadData, WriteData};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Dummy memory that counts how often it has been torn down.
pub struct CountingMemory {
    mem: DummyMemory,
    teardowns: Arc<AtomicUsize>,
}

impl CountingMemory {
    pub fn new(size: u64, teardowns: Arc<AtomicUsize>) -> Self {
        Self {
            mem: DummyMemory::with_size(size),
            teardowns,
        }
    }
}

impl Drop for CountingMemory {
    fn drop(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

impl PhysicalMemory for CountingMemory {
    fn phys_read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        self.mem.phys_read_raw_list(data)
    }

    fn phys_write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        self.mem.phys_write_raw_list(data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        self.mem.metadata()
    }
}

/// Descriptor named `mock` with a zeroed address space of `size` bytes.
pub fn mock_descriptor(size: u64, teardowns: Arc<AtomicUsize>) -> BackendDescriptor {
    BackendDescriptor::new("mock", "counting test backend", move |_args| {
        Ok(Box::new(CountingMemory::new(size, teardowns.clone())) as Box<dyn PhysicalMemory>)
    })
}

/// Registry with only the `mock` backend; returns its teardown counter.
pub fn mock_registry(size: u64) -> (BackendRegistry, Arc<AtomicUsize>) {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let registry = RegistryBuilder::new()
        .with(mock_descriptor(size, teardowns.clone()))
        .expect("fresh builder")
        .build();
    (registry, teardowns)
}

pub fn teardowns(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
