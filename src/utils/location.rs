//! Source location tracking for pragma and loop diagnostics.
//!
//! Every directive, clause argument and loop statement carries a [`Span`] so
//! that diagnostics point at the offending source text and can be reported
//! in source order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A position in source code. Lines and columns are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    /// Byte offset from start of file
    pub offset: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }

    /// The first character of a file.
    pub fn start() -> Self {
        Self::new(1, 1, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A range of source text. The all-zero span marks synthesized nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Span {
    /// A span without byte offsets.
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Self { start_line, start_column, end_line, end_column, ..Self::default() }
    }

    pub fn from_locations(start: SourceLocation, end: SourceLocation) -> Self {
        Self {
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
            start_offset: start.offset,
            end_offset: end.offset,
        }
    }

    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn is_dummy(&self) -> bool {
        self.start_line == 0 && self.end_line == 0
    }

    /// The smallest span covering both. A dummy side is ignored.
    pub fn merge(&self, other: &Span) -> Span {
        if self.is_dummy() {
            return *other;
        }
        if other.is_dummy() {
            return *self;
        }
        let first = if self.source_order(other) == Ordering::Greater { other } else { self };
        let last = if (self.end_line, self.end_column) >= (other.end_line, other.end_column) {
            self
        } else {
            other
        };
        Span {
            start_line: first.start_line,
            start_column: first.start_column,
            start_offset: first.start_offset,
            end_line: last.end_line,
            end_column: last.end_column,
            end_offset: last.end_offset,
        }
    }

    /// Order two spans by their start position.
    pub fn source_order(&self, other: &Span) -> Ordering {
        (self.start_line, self.start_column).cmp(&(other.start_line, other.start_column))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}-{}", self.start_line, self.start_column, self.end_column)
        } else {
            write!(f, "{}:{}-{}:{}", self.start_line, self.start_column, self.end_line, self.end_column)
        }
    }
}

/// Line lookup over a source buffer, used when rendering diagnostics.
#[derive(Debug, Clone)]
pub struct SourceMap {
    source: String,
    /// Byte offset of each line start
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source: source.to_string(), line_starts }
    }

    /// Text of a 1-indexed line, without its line terminator.
    pub fn line(&self, line_number: usize) -> Option<&str> {
        let start = *self.line_starts.get(line_number.checked_sub(1)?)?;
        let end = self.line_starts.get(line_number).copied().unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches(['\n', '\r']))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_display() {
        assert_eq!(Span::new(1, 5, 1, 10).to_string(), "1:5-10");
        assert_eq!(Span::new(1, 5, 3, 10).to_string(), "1:5-3:10");
    }

    #[test]
    fn test_span_merge_ignores_dummy() {
        let span = Span::new(2, 3, 2, 9);
        assert_eq!(span.merge(&Span::dummy()), span);
        assert_eq!(Span::dummy().merge(&span), span);
    }

    #[test]
    fn test_source_order() {
        let a = Span::new(1, 10, 1, 12);
        let b = Span::new(2, 1, 2, 4);
        assert_eq!(a.source_order(&b), Ordering::Less);
        let merged = b.merge(&a);
        assert_eq!((merged.start_line, merged.start_column), (1, 10));
        assert_eq!(merged.end_line, 2);
    }

    #[test]
    fn test_source_map_lines() {
        let map = SourceMap::new("#pragma clang transform unroll\r\nfor (;;) {}\n");
        assert_eq!(map.line(1), Some("#pragma clang transform unroll"));
        assert_eq!(map.line(2), Some("for (;;) {}"));
        assert_eq!(map.line(3), Some(""));
        assert_eq!(map.line(0), None);
        assert_eq!(map.line(4), None);
    }
}
