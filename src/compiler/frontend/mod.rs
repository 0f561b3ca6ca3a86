pub mod cli;
pub mod config;
pub mod parser;

pub use cli::{cli_main, Cli, CliConfig};
pub use config::{CheckConfig, Config, ErrorFormat, JoinStrategy};
pub use parser::{parse_expression, parse_module, ParseError};
