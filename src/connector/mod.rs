//! Connectors: live, shareable handles to a physical-memory backend.
//!
//! A `ConnectorInstance` is created from a registered `BackendDescriptor`
//! and shares one backend between all of its clones. The backend is torn
//! down exactly once, when the last clone and the last view derived from it
//! are gone. Reads and writes go through a `PhysicalView`.

pub mod args;
pub mod cpu_state;
pub mod registry;

pub use args::ConnectorArgs;
pub use cpu_state::CpuState;
pub use registry::{BackendDescriptor, BackendFactory, BackendRegistry, Discovery, RegistryBuilder};

use crate::error::{MemError, Result};
use crate::mem::{
    BatchStatus, ConnectorFeatures, MemoryView, PhysicalMemory, PhysicalMemoryMetadata, ReadData,
    WriteData,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

struct ConnectorInner {
    name: String,
    backend: Box<dyn PhysicalMemory>,
}

impl Drop for ConnectorInner {
    fn drop(&mut self) {
        debug!(connector = %self.name, "tearing down connector");
    }
}

/// Shared handle to an initialized backend.
///
/// Cloning bumps an atomic share count. `release` consumes the handle, so a
/// released handle cannot be used again.
#[derive(Clone)]
pub struct ConnectorInstance {
    inner: Arc<ConnectorInner>,
}

impl ConnectorInstance {
    /// Run the descriptor's factory with `args`.
    pub fn create(descriptor: &BackendDescriptor, args: &str) -> Result<Self> {
        let backend = descriptor.instantiate(args)?;
        debug!(connector = %descriptor.name, args, "created connector");
        Ok(Self::from_backend(&descriptor.name, backend))
    }

    /// Wrap an already constructed backend.
    pub fn from_backend(name: &str, backend: Box<dyn PhysicalMemory>) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                name: name.to_string(),
                backend,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Backend metadata; `CPU_STATE` is set exactly when `cpu_state` is
    /// available.
    pub fn metadata(&self) -> PhysicalMemoryMetadata {
        let mut meta = self.inner.backend.metadata();
        meta.features
            .set(ConnectorFeatures::CPU_STATE, self.cpu_state().is_some());
        meta
    }

    pub fn cpu_state(&self) -> Option<&dyn CpuState> {
        self.inner.backend.cpu_state()
    }

    /// Pause the target's CPUs. `Unsupported` if the backend has no CPU
    /// control.
    pub fn pause(&self) -> Result<()> {
        self.require_cpu_state()?.pause()?;
        debug!(connector = %self.inner.name, "target paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.require_cpu_state()?.resume()?;
        debug!(connector = %self.inner.name, "target resumed");
        Ok(())
    }

    fn require_cpu_state(&self) -> Result<&dyn CpuState> {
        self.cpu_state().ok_or_else(|| MemError::Unsupported {
            backend: self.inner.name.clone(),
            feature: "cpu_state",
        })
    }

    /// Number of live handles sharing this backend, counting each family of
    /// views as one.
    pub fn share_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Derive a view for physical reads and writes.
    ///
    /// The view keeps the backend alive on its own; releasing this handle
    /// afterwards is fine.
    pub fn physical_view(&self) -> PhysicalView {
        PhysicalView {
            conn: Arc::new(self.clone()),
        }
    }

    /// Give up this handle. The backend is torn down if it was the last one.
    pub fn release(self) {
        trace!(
            connector = %self.inner.name,
            remaining = Arc::strong_count(&self.inner) - 1,
            "releasing connector handle"
        );
    }

    /// Whether two handles share the same backend.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn backend(&self) -> &dyn PhysicalMemory {
        self.inner.backend.as_ref()
    }
}

impl fmt::Debug for ConnectorInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorInstance")
            .field("name", &self.inner.name)
            .field("share_count", &self.share_count())
            .finish()
    }
}

/// Physical-address view of a connector.
#[derive(Clone)]
pub struct PhysicalView {
    conn: Arc<ConnectorInstance>,
}

impl PhysicalView {
    pub fn connector(&self) -> &ConnectorInstance {
        &self.conn
    }

    /// Number of live clones of this view.
    pub fn view_count(&self) -> usize {
        Arc::strong_count(&self.conn)
    }

    pub fn release(self) {
        trace!(
            connector = %self.conn.name(),
            remaining = Arc::strong_count(&self.conn) - 1,
            "releasing view"
        );
    }
}

impl fmt::Debug for PhysicalView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalView")
            .field("connector", &self.conn.name())
            .field("view_count", &self.view_count())
            .finish()
    }
}

impl MemoryView for PhysicalView {
    fn read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        trace!(connector = %self.conn.name(), entries = data.len(), "phys read batch");
        let status = self.conn.backend().phys_read_raw_list(data);
        if !status.is_ok() {
            warn!(
                connector = %self.conn.name(),
                failed = ?status.failed(),
                "phys read batch incomplete"
            );
        }
        status
    }

    fn write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        trace!(connector = %self.conn.name(), entries = data.len(), "phys write batch");
        let status = self.conn.backend().phys_write_raw_list(data);
        if !status.is_ok() {
            warn!(
                connector = %self.conn.name(),
                failed = ?status.failed(),
                "phys write batch incomplete"
            );
        }
        status
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        self.conn.metadata()
    }
}
