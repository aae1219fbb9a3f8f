//! Error handling for Python bindings.
//!
//! Converts Rust errors to appropriate Python exceptions.

use linehash::HashError;
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::PyErr;

/// Convert HashError to appropriate Python exception.
pub fn to_py_err(e: HashError) -> PyErr {
    match e {
        HashError::Io(_)
        | HashError::Open { .. }
        | HashError::Read { .. }
        | HashError::Write { .. }
        | HashError::SourceChanged { .. } => PyIOError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}
