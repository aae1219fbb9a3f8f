//! Python bindings for linehash.
//!
//! Builds run entirely in Rust with the GIL released, so several sources can
//! be hashed from Python threads, or in one call with `build_hashes`.

mod errors;

use errors::to_py_err;
use pyo3::prelude::*;
use rayon::prelude::*;

use linehash::commands::lookup_keys;
use linehash::config::Encoding;
use linehash::parts::LocalStorage;
use linehash::HashError;

fn parse_encoding(encoding: &str) -> PyResult<Encoding> {
    encoding.parse::<Encoding>().map_err(to_py_err)
}

/// Build hash artifacts for one source and return its number of keys.
///
/// Writes `<source>.map` when `signature_width <= 0` or `keep_unsigned` is
/// set, `<source>.smap` when `signature_width > 0`, and `<source>.mapinfo`
/// when `write_info` is set.
///
/// Example:
///     >>> import pylinehash
///     >>> pylinehash.build_hash("keys.txt", signature_width=32, write_info=True)
///     3
#[pyfunction]
#[pyo3(signature = (source, signature_width=0, keep_unsigned=false, encoding="utf-8", write_info=false))]
fn build_hash(
    py: Python<'_>,
    source: &str,
    signature_width: i32,
    keep_unsigned: bool,
    encoding: &str,
    write_info: bool,
) -> PyResult<u64> {
    let encoding = parse_encoding(encoding)?;
    py.allow_threads(|| {
        linehash::build_hash(
            &LocalStorage::new(),
            source,
            signature_width,
            keep_unsigned,
            encoding,
            write_info,
        )
    })
    .map_err(to_py_err)
}

/// Build several sources in parallel; returns the key counts in order.
///
/// Fails with the first error encountered; artifacts of sources that
/// succeeded are kept.
#[pyfunction]
#[pyo3(signature = (sources, signature_width=0, keep_unsigned=false, encoding="utf-8", write_info=false))]
fn build_hashes(
    py: Python<'_>,
    sources: Vec<String>,
    signature_width: i32,
    keep_unsigned: bool,
    encoding: &str,
    write_info: bool,
) -> PyResult<Vec<u64>> {
    let encoding = parse_encoding(encoding)?;
    py.allow_threads(|| -> Result<Vec<u64>, HashError> {
        let storage = LocalStorage::new();
        sources
            .par_iter()
            .map(|source| {
                linehash::build_hash(
                    &storage,
                    source,
                    signature_width,
                    keep_unsigned,
                    encoding,
                    write_info,
                )
            })
            .collect()
    })
    .map_err(to_py_err)
}

/// Look up keys in a `.map` or `.smap` file.
///
/// Returns the input position of each key, or `None` where the map rejects
/// it.
///
/// Example:
///     >>> pylinehash.lookup("keys.txt.smap", ["alpha", "nope"])
///     [0, None]
#[pyfunction]
fn lookup(py: Python<'_>, path: &str, keys: Vec<String>) -> PyResult<Vec<Option<u64>>> {
    py.allow_threads(|| lookup_keys(path, keys.iter().map(String::as_str)))
        .map_err(to_py_err)
}

/// linehash: order-preserving minimal perfect hashing over line sources.
#[pymodule]
fn pylinehash(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(build_hash, m)?)?;
    m.add_function(wrap_pyfunction!(build_hashes, m)?)?;
    m.add_function(wrap_pyfunction!(lookup, m)?)?;

    // Version
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
