//! memgate: uniform physical-memory access over pluggable connectors.
//!
//! Backends register by name in a `BackendRegistry`. A created connector is
//! a shared, reference-counted handle; views derived from it read and write
//! physical memory in batches with one status per entry. Foreign callers go
//! through a `Session` that hands out opaque tokens instead of pointers.

pub mod config;
pub mod connector;
pub mod connectors;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod mem;
pub mod types;
pub mod watchdog;

#[cfg(feature = "python-ext")]
pub mod python_bindings;

pub use config::MemConfig;
pub use connector::{BackendDescriptor, BackendRegistry, ConnectorInstance, PhysicalView, RegistryBuilder};
pub use error::{MemError, Result, ResultCode};
pub use ffi::Session;
pub use mem::{BatchStatus, MemoryView, PhysicalMemory, ReadData, WriteData};
pub use types::Address;

#[cfg(feature = "python-ext")]
use pyo3::prelude::*;

/// A Python module implemented in Rust.
#[cfg(feature = "python-ext")]
#[pymodule]
fn memgate(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python_bindings::register_python_bindings(m.py(), m)
}
