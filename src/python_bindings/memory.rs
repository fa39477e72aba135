//! Python classes for connectors and views.
//!
//! Python has no ownership typing, so each object carries its inner handle
//! as an `Option` and `release()` takes it out. Any later use raises.

use crate::config::MemConfig;
use crate::connector::{BackendRegistry, ConnectorInstance, PhysicalView};
use crate::connectors;
use crate::error::MemError;
use crate::mem::{MemoryView, ReadData, WriteData};
use crate::types::Address;
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::types::PyBytes;

fn released(what: &str) -> PyErr {
    PyRuntimeError::new_err(format!("{what} has already been released"))
}

/// Registry of available connector backends.
#[pyclass(name = "Inventory", module = "memgate")]
pub struct PyInventory {
    registry: BackendRegistry,
}

#[pymethods]
impl PyInventory {
    /// Inventory of the built-in backends, optionally configured from JSON.
    #[new]
    #[pyo3(signature = (config_json=None))]
    fn new(config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => MemConfig::from_json_str(json)?,
            None => MemConfig::default(),
        };
        Ok(Self {
            registry: connectors::builtin_registry(&config),
        })
    }

    fn available_connectors(&self) -> Vec<String> {
        self.registry.names().into_iter().map(str::to_string).collect()
    }

    #[pyo3(signature = (name, args=""))]
    fn create_connector(&self, name: &str, args: &str) -> PyResult<PyConnector> {
        let conn = self.registry.create(name, args)?;
        Ok(PyConnector { inner: Some(conn) })
    }

    fn __len__(&self) -> usize {
        self.registry.len()
    }

    fn __contains__(&self, name: &str) -> bool {
        self.registry.contains(name)
    }
}

/// A live connector handle.
#[pyclass(name = "Connector", module = "memgate")]
pub struct PyConnector {
    inner: Option<ConnectorInstance>,
}

impl PyConnector {
    fn get(&self) -> PyResult<&ConnectorInstance> {
        self.inner.as_ref().ok_or_else(|| released("connector"))
    }
}

#[pymethods]
impl PyConnector {
    #[getter]
    fn name(&self) -> PyResult<String> {
        Ok(self.get()?.name().to_string())
    }

    /// `(size, readonly)` of the physical address space.
    fn metadata(&self) -> PyResult<(u64, bool)> {
        let meta = self.get()?.metadata();
        Ok((meta.size, meta.readonly))
    }

    /// Pause the target's CPUs; raises `NotImplementedError` for backends
    /// without CPU control.
    fn pause(&self) -> PyResult<()> {
        Ok(self.get()?.pause()?)
    }

    fn resume(&self) -> PyResult<()> {
        Ok(self.get()?.resume()?)
    }

    /// `None` when the backend has no CPU control.
    #[getter]
    fn paused(&self) -> PyResult<Option<bool>> {
        Ok(self.get()?.cpu_state().map(|cpu| cpu.is_paused()))
    }

    fn share_count(&self) -> PyResult<usize> {
        Ok(self.get()?.share_count())
    }

    fn clone(&self) -> PyResult<PyConnector> {
        Ok(PyConnector {
            inner: Some(self.get()?.clone()),
        })
    }

    fn phys_view(&self) -> PyResult<PyMemoryView> {
        Ok(PyMemoryView {
            inner: Some(self.get()?.physical_view()),
        })
    }

    /// Release this handle. Releasing twice raises.
    fn release(&mut self) -> PyResult<()> {
        self.inner.take().ok_or_else(|| released("connector"))?.release();
        Ok(())
    }

    #[getter]
    fn released(&self) -> bool {
        self.inner.is_none()
    }

    fn __repr__(&self) -> String {
        match &self.inner {
            Some(c) => format!("Connector(name={:?}, shares={})", c.name(), c.share_count()),
            None => "Connector(<released>)".to_string(),
        }
    }
}

/// Physical memory view of a connector.
#[pyclass(name = "MemoryView", module = "memgate")]
pub struct PyMemoryView {
    inner: Option<PhysicalView>,
}

impl PyMemoryView {
    fn get(&self) -> PyResult<&PhysicalView> {
        self.inner.as_ref().ok_or_else(|| released("view"))
    }
}

#[pymethods]
impl PyMemoryView {
    fn read<'py>(&self, py: Python<'py>, address: u64, len: usize) -> PyResult<Bound<'py, PyBytes>> {
        let data = self.get()?.read_raw(Address::new(address), len)?;
        Ok(PyBytes::new(py, &data))
    }

    /// Read many `(address, len)` ranges in one batch. Failed entries come
    /// back as `None`.
    fn read_list<'py>(
        &self,
        py: Python<'py>,
        requests: Vec<(u64, usize)>,
    ) -> PyResult<Vec<Option<Bound<'py, PyBytes>>>> {
        let view = self.get()?;
        let mut buffers = requests
            .iter()
            .map(|&(_, len)| crate::mem::try_alloc_zeroed(len))
            .collect::<Result<Vec<_>, MemError>>()?;
        let mut data: Vec<ReadData<'_>> = requests
            .iter()
            .zip(buffers.iter_mut())
            .map(|(&(address, _), buf)| ReadData::new(address, buf.as_mut_slice()))
            .collect();
        let status = view.read_raw_list(&mut data);
        drop(data);

        Ok(buffers
            .iter()
            .zip(status)
            .map(|(buf, outcome)| outcome.ok().map(|()| PyBytes::new(py, buf)))
            .collect())
    }

    fn write(&self, address: u64, data: &[u8]) -> PyResult<()> {
        self.get()?.write_raw(Address::new(address), data)?;
        Ok(())
    }

    /// Write many `(address, bytes)` pairs in order; returns one bool per
    /// entry.
    fn write_list(&self, entries: Vec<(u64, Vec<u8>)>) -> PyResult<Vec<bool>> {
        let view = self.get()?;
        let data: Vec<WriteData<'_>> = entries
            .iter()
            .map(|(address, buf)| WriteData::new(*address, buf.as_slice()))
            .collect();
        Ok(view.write_raw_list(&data).iter().map(|r| r.is_ok()).collect())
    }

    fn read_u64(&self, address: u64) -> PyResult<u64> {
        Ok(self.get()?.read_u64(Address::new(address))?)
    }

    #[pyo3(signature = (address, max_len=256))]
    fn read_cstr(&self, address: u64, max_len: usize) -> PyResult<String> {
        Ok(self.get()?.read_cstr(Address::new(address), max_len)?)
    }

    #[getter]
    fn size(&self) -> PyResult<u64> {
        Ok(self.get()?.metadata().size)
    }

    fn clone(&self) -> PyResult<PyMemoryView> {
        Ok(PyMemoryView {
            inner: Some(self.get()?.clone()),
        })
    }

    fn release(&mut self) -> PyResult<()> {
        self.inner.take().ok_or_else(|| released("view"))?.release();
        Ok(())
    }

    #[getter]
    fn released(&self) -> bool {
        self.inner.is_none()
    }
}
