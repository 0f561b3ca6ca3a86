pub mod logging;
pub mod parallel;

pub use logging::{init_file_logging, init_logging, try_init, LogConfig, LogFormat, LogOutput};
pub use parallel::{check_source, FileReport, ParallelAnalyzer};
