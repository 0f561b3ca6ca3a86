//! Parallel file analysis
//!
//! Every file gets its own [`TypeChecker`] and its own view of the
//! configuration (with per-path overrides applied), so files are independent
//! and run on a rayon pool without shared state.

use crate::compiler::analysis::TypeChecker;
use crate::compiler::errors::{ErrorKind, SourceLocation, TypeError};
use crate::compiler::frontend::Config;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Diagnostics for one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub errors: Vec<TypeError>,
    /// Errors past `max_errors`
    pub dropped: usize,
    pub duration_ms: u64,
}

impl FileReport {
    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|e| e.is_error()).count() + self.dropped
    }
}

/// Check one in-memory module with `config` already resolved for its path
pub fn check_source(source: &str, file: &str, config: &Config) -> (Vec<TypeError>, usize) {
    let mut checker = TypeChecker::with_config(source, config.check.clone())
        .with_file(file)
        .with_max_errors(config.errors.max_errors);
    checker.check_source(source);
    let dropped = checker.dropped();
    (checker.into_errors(), dropped)
}

pub struct ParallelAnalyzer {
    config: Config,
    /// 0 lets rayon pick
    workers: usize,
    parallel: bool,
}

impl ParallelAnalyzer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workers: 0,
            parallel: true,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Expand directories to the Python files the configuration selects.
    /// Files named explicitly are always kept.
    pub fn collect_files(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
        let mut files = Vec::new();

        for path in paths {
            if path.is_file() {
                files.push(path.clone());
            } else if path.is_dir() {
                let pattern = format!("{}/**/*.py", path.display());
                let entries =
                    glob::glob(&pattern).map_err(|e| format!("Glob pattern error: {}", e))?;
                for entry in entries {
                    match entry {
                        Ok(file) if file.is_file() => {
                            let relative = file.strip_prefix(path).unwrap_or(file.as_path());
                            if self.config.should_check(relative) {
                                files.push(file);
                            } else {
                                debug!(file = %file.display(), "Excluded by configuration");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Skipping unreadable path"),
                    }
                }
            } else {
                return Err(format!("Path not found: {}", path.display()));
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    #[instrument(skip(self, paths), fields(paths = paths.len()))]
    pub fn analyze_paths(&self, paths: &[PathBuf]) -> Result<Vec<FileReport>, String> {
        let files = self.collect_files(paths)?;
        self.analyze_files(&files)
    }

    /// Reports come back in the order of `files`
    pub fn analyze_files(&self, files: &[PathBuf]) -> Result<Vec<FileReport>, String> {
        info!(
            files = files.len(),
            parallel = self.parallel,
            workers = self.workers,
            "Analyzing files"
        );

        if !self.parallel || files.len() < 2 {
            return Ok(files.iter().map(|f| self.analyze_file(f)).collect());
        }

        // A local pool keeps `--jobs` from touching rayon's global pool
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| format!("Failed to start worker pool: {}", e))?;

        Ok(pool.install(|| files.par_iter().map(|f| self.analyze_file(f)).collect()))
    }

    pub fn analyze_file(&self, path: &Path) -> FileReport {
        let start = Instant::now();
        let shown = path.display().to_string();

        let (errors, dropped) = match fs::read_to_string(path) {
            Ok(source) => check_source(&source, &shown, &self.config.for_file(path)),
            Err(e) => {
                warn!(file = %shown, error = %e, "Failed to read file");
                let error = TypeError::new(
                    ErrorKind::Io {
                        detail: format!("Failed to read {}: {}", shown, e),
                    },
                    SourceLocation::unknown(),
                )
                .with_file(shown.clone());
                (vec![error], 0)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(file = %shown, errors = errors.len(), duration_ms, "Analyzed file");

        FileReport {
            path: path.to_path_buf(),
            errors,
            dropped,
            duration_ms,
        }
    }
}
