//! Source locations for rustpython AST nodes
//!
//! rustpython-parser 0.3 exposes byte offsets through the `Ranged` trait.
//! Diagnostics want line:column, so every checked file carries a `LineIndex`
//! built once from its source text.

use crate::compiler::errors::SourceLocation;
use rustpython_parser::ast::Ranged;
use rustpython_parser::text_size::TextRange;

/// Line index for byte offset to line/column conversion
#[derive(Debug, Clone)]
pub struct LineIndex {
    source: String,
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            source: source.to_string(),
            line_starts,
        }
    }

    /// Convert byte offset to (line, column), lines 1-indexed and columns
    /// counted in characters
    pub fn offset_to_position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let start = self.line_starts[line];
        let column = match self.source.get(start..offset) {
            Some(text) => text.chars().count(),
            None => offset.saturating_sub(start),
        };
        (line + 1, column)
    }

    pub fn location(&self, range: TextRange) -> SourceLocation {
        SourceLocation::from_range(
            self.offset_to_position(usize::from(range.start())),
            self.offset_to_position(usize::from(range.end())),
        )
    }

    /// Shift a location found inside a string annotation to the string's position
    pub fn relocate(&self, inner: TextRange, outer: TextRange) -> SourceLocation {
        let start = usize::from(outer.start());
        let base = start + self.literal_opening(start);
        SourceLocation::from_range(
            self.offset_to_position(base + usize::from(inner.start())),
            self.offset_to_position(base + usize::from(inner.end())),
        )
    }

    /// Bytes of prefix letters and quotes before a string literal's body
    fn literal_opening(&self, start: usize) -> usize {
        let Some(text) = self.source.get(start..) else {
            return 1;
        };
        let letters = text.bytes().take_while(u8::is_ascii_alphabetic).count();
        let rest = &text.as_bytes()[letters..];
        match rest {
            [q @ (b'"' | b'\''), ..] if rest.starts_with(&[*q; 3]) => letters + 3,
            _ => letters + 1,
        }
    }
}

/// Extension trait for extracting source locations from AST nodes
pub trait SourceLocationExt {
    fn source_location(&self, index: &LineIndex) -> SourceLocation;
}

impl<T: Ranged> SourceLocationExt for T {
    fn source_location(&self, index: &LineIndex) -> SourceLocation {
        index.location(self.range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::frontend::parse_module;
    use rustpython_parser::ast::{Mod, ModModule};

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("line1\nline2\nline3");

        assert_eq!(index.offset_to_position(0), (1, 0));
        assert_eq!(index.offset_to_position(6), (2, 0));
        assert_eq!(index.offset_to_position(8), (2, 2));
        assert_eq!(index.offset_to_position(12), (3, 0));
    }

    #[test]
    fn test_stmt_location() {
        let source = "x = 1\ndef foo():\n    return 42";
        let index = LineIndex::new(source);
        let ast = parse_module(source).unwrap();

        if let Mod::Module(ModModule { body, .. }) = &ast {
            let loc = body[1].source_location(&index);
            assert_eq!(loc.line, 2);
            assert_eq!(loc.col, 0);
            assert!(loc.end_line >= 3);
        } else {
            panic!("expected module");
        }
    }

    #[test]
    fn test_columns_count_characters() {
        let index = LineIndex::new("s = \"héllo\"; x = 1\n€ = 2");

        // `x` sits after the two-byte `é`
        assert_eq!(index.offset_to_position(14), (1, 13));
        // `=` after the three-byte `€`
        assert_eq!(index.offset_to_position(24), (2, 2));
    }

    #[test]
    fn test_relocate_skips_literal_opening() {
        let inner = TextRange::new(0.into(), 1.into());
        let cases =
            [("x: 'P'", 4), ("x: \"\"\"P\"\"\"", 6), ("x: r'P'", 5), ("x: Rb\'\'\'P\'\'\'", 8)];
        for (source, col) in cases {
            let index = LineIndex::new(source);
            let outer = TextRange::new(3.into(), (source.len() as u32).into());
            let loc = index.relocate(inner, outer);
            assert_eq!((loc.line, loc.col), (1, col), "{}", source);
        }
    }
}
