use serde::{Deserialize, Serialize};
use std::fmt;

/// A region of source text.
///
/// `start`/`end` are byte offsets, `line`/`column` are 1-based and describe
/// `start`; `end_line` is the 1-based line containing the last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
            end_line: line,
        }
    }

    pub fn with_end_line(mut self, end_line: u32) -> Self {
        self.end_line = end_line.max(self.line);
        self
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(&self, other: &Span) -> Span {
        let (first, last) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            start: first.start,
            end: self.end.max(other.end),
            line: first.line,
            column: first.column,
            end_line: first.end_line.max(last.end_line),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to line/column positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let column = offset - self.line_starts[line];
        (line as u32 + 1, column as u32 + 1)
    }

    pub fn span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.line_col(start);
        let (end_line, _) = self.line_col(end.saturating_sub(1).max(start));
        Span::new(start, end, line, column).with_end_line(end_line)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_positions() {
        let index = LineIndex::new("unit A;\ninterface\n\nend.");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(5), (1, 6));
        assert_eq!(index.line_col(8), (2, 1));
        assert_eq!(index.line_col(18), (3, 1));
        assert_eq!(index.line_col(19), (4, 1));
        assert_eq!(index.line_col(20), (4, 2));
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn test_span_end_line() {
        let index = LineIndex::new("begin\n  X := 1;\nend");
        let span = index.span(0, 19);
        assert_eq!(span.line, 1);
        assert_eq!(span.end_line, 3);
    }

    #[test]
    fn test_span_merge() {
        let a = Span::new(10, 12, 2, 3);
        let b = Span::new(2, 4, 1, 3);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 2);
        assert_eq!(merged.end, 12);
        assert_eq!(merged.line, 1);
        assert_eq!(merged.end_line, 2);
    }
}
