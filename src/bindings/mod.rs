//! Python extension module, built with `--features python`

use crate::compiler::analysis::TypeChecker;
use crate::compiler::frontend::Config;
use crate::infrastructure::parallel;
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use std::path::Path;

fn render(errors: &[crate::compiler::errors::TypeError]) -> Vec<String> {
    errors.iter().map(|e| e.render(true, true)).collect()
}

/// Diagnostics for a module given as text
#[pyfunction]
#[pyo3(signature = (source, file = "<string>"))]
fn check_source(source: &str, file: &str) -> Vec<String> {
    let (errors, _) = parallel::check_source(source, file, &Config::default());
    render(&errors)
}

/// Diagnostics for a file, using the configuration discovered from its directory
#[pyfunction]
fn check_file(path: &str) -> PyResult<Vec<String>> {
    let path = Path::new(path);
    let source = std::fs::read_to_string(path).map_err(|e| PyIOError::new_err(e.to_string()))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let config = Config::discover_from(dir).for_file(path);

    let (errors, _) = parallel::check_source(&source, &path.display().to_string(), &config);
    Ok(render(&errors))
}

/// Inferred type of a module-level name after checking `source`
#[pyfunction]
fn reveal(source: &str, name: &str) -> PyResult<String> {
    let mut checker = TypeChecker::new(source);
    checker.check_source(source);
    checker
        .type_of(name)
        .map(|ty| ty.to_string())
        .ok_or_else(|| PyValueError::new_err(format!("'{}' is not defined at module level", name)))
}

#[pymodule]
fn paramspec(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(check_source, m)?)?;
    m.add_function(wrap_pyfunction!(check_file, m)?)?;
    m.add_function(wrap_pyfunction!(reveal, m)?)?;
    Ok(())
}
