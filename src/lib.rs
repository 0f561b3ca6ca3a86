//! Static checking of parameter specification variables (`typing.ParamSpec`)
//! in Python source.
//!
//! The pipeline: [`compiler::frontend`] parses, [`compiler::analysis`] walks
//! the module and applies the declaration, use-site, projection and call
//! rules, [`compiler::errors`] carries the diagnostics, and
//! [`infrastructure`] runs many files in parallel.

pub mod compiler {
    pub mod analysis;
    pub mod ast;
    pub mod errors;
    pub mod frontend;
    pub mod types;
}

pub mod infrastructure;

#[cfg(feature = "python")]
pub mod bindings;

pub use compiler::analysis::TypeChecker;
pub use compiler::errors::{ErrorCollector, ErrorKind, Severity, SourceLocation, TypeError};
pub use compiler::frontend::{cli_main, parse_expression, parse_module, Config};
pub use compiler::types::{CallArgs, ParamKind, Parameter, Signature, Type, TypeContext};
pub use infrastructure::{
    check_source, FileReport, LogConfig, LogFormat, LogOutput, ParallelAnalyzer,
};
