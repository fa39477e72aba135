//! Python bindings for memgate.
//!
//! Built only with the `python-ext` feature.

pub mod memory;

use pyo3::prelude::*;

/// Register all Python bindings with the module.
pub fn register_python_bindings(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<memory::PyInventory>()?;
    m.add_class::<memory::PyConnector>()?;
    m.add_class::<memory::PyMemoryView>()?;

    m.add_class::<crate::logging::LogLevel>()?;
    m.add_function(wrap_pyfunction!(crate::logging::init_logging, m)?)?;

    Ok(())
}
