use rustpython_parser::ast::{Expr, Mod, ModExpression};
use rustpython_parser::{parse, Mode};
use std::fmt;
use tracing::{debug, error, instrument};

/// Parse failure with the byte offset the parser stopped at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl From<rustpython_parser::ParseError> for ParseError {
    fn from(e: rustpython_parser::ParseError) -> Self {
        Self {
            message: e.error.to_string(),
            offset: usize::from(e.offset),
        }
    }
}

#[instrument(skip(source), fields(source_len = source.len()))]
pub fn parse_module(source: &str) -> Result<Mod, ParseError> {
    debug!("Parsing module");
    parse(source, Mode::Module, "<string>").map_err(|e| {
        error!(error = %e, "Failed to parse module");
        ParseError::from(e)
    })
}

/// Parse a single expression, used for string annotations
#[instrument(skip(source), fields(source_len = source.len()))]
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    debug!("Parsing expression");
    match parse(source, Mode::Expression, "<string>") {
        Ok(Mod::Expression(ModExpression { body, .. })) => Ok(*body),
        Ok(_) => Err(ParseError {
            message: "expected expression".to_string(),
            offset: 0,
        }),
        Err(e) => {
            debug!(error = %e, "Failed to parse expression");
            Err(ParseError::from(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decorator_module() {
        let source = r#"
from typing import Callable, ParamSpec, TypeVar

P = ParamSpec("P")
R = TypeVar("R")

def logged(f: Callable[P, R]) -> Callable[P, R]:
    def inner(*args: P.args, **kwargs: P.kwargs) -> R:
        return f(*args, **kwargs)
    return inner
"#;
        assert!(parse_module(source).is_ok());
    }

    #[test]
    fn test_parse_error_offset() {
        let err = parse_module("def f(:\n    pass").unwrap_err();
        assert!(err.offset > 0);
        assert!(err.to_string().starts_with("Parse error"));
    }

    #[test]
    fn test_parse_expression() {
        assert!(parse_expression("Callable[P, int]").is_ok());
        assert!(parse_expression("Callable[").is_err());
    }
}
