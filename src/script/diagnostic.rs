//! Positioned diagnostics and offset → line/column mapping.
//!
//! Parser errors arrive as chumsky `Rich` errors and are flattened into
//! [`Diagnostic`]s; the `(line,col): error: message` rendering is the
//! sandbox's output format.

use std::fmt;

use chumsky::error::{Rich, RichPattern, RichReason};

/// Byte range into the source a node was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// A single front-end or runtime error, anchored at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub offset: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }

    /// Flatten a chumsky error whose span is relative to `base`.
    pub fn from_rich<T: fmt::Display>(error: &Rich<'_, T>, base: usize) -> Self {
        let message = match error.reason() {
            RichReason::Custom(message) => message.clone(),
            _ => expected_found(error),
        };
        Self::new(base + error.span().start, message)
    }

    /// `(line,col): error: message` against the source it came from.
    pub fn render(&self, index: &LineIndex) -> String {
        let (line, col) = index.position(self.offset);
        format!("({line},{col}): error: {}", self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}: {}", self.offset, self.message)
    }
}

/// Tokens that close or separate a construct. When one of them is expected,
/// operators that could merely extend the expression are left out.
const DELIMITERS: &[&str] = &["`;`", "`)`", "`]`", "`}`", "`,`", "`:`", "`=`", "`=>`"];

fn expected_found<T: fmt::Display>(error: &Rich<'_, T>) -> String {
    let mut anchors = Vec::new();
    let mut operators = Vec::new();
    for pattern in error.expected() {
        match pattern {
            RichPattern::Token(token) => {
                let text = (**token).to_string();
                if DELIMITERS.contains(&text.as_str()) {
                    anchors.push(text);
                } else {
                    operators.push(text);
                }
            }
            RichPattern::Label(label) => anchors.push(label.to_string()),
            RichPattern::EndOfInput => anchors.push("end of input".to_string()),
            _ => {}
        }
    }
    let mut expected = if anchors.is_empty() { operators } else { anchors };
    expected.sort();
    expected.dedup();

    let found = error
        .found()
        .map_or_else(|| "end of input".to_string(), ToString::to_string);
    match expected.split_last() {
        None => format!("unexpected {found}"),
        Some((last, [])) => format!("expected {last}, found {found}"),
        Some((last, rest)) => format!("expected {} or {last}, found {found}", rest.join(", ")),
    }
}

/// Sort by position and render every diagnostic against `source`.
pub fn render_all(mut diagnostics: Vec<Diagnostic>, source: &str) -> Vec<String> {
    let index = LineIndex::new(source);
    diagnostics.sort_by_key(|d| d.offset);
    diagnostics.dedup();
    diagnostics.iter().map(|d| d.render(&index)).collect()
}

/// Line start offsets of a source text.
pub struct LineIndex<'a> {
    source: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    /// 1-based line and column (column counted in chars).
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.starts[line];
        let col = self
            .source
            .get(start..offset)
            .map_or(offset - start, |s| s.chars().count());
        (line + 1, col + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_positions() {
        let index = LineIndex::new("ab\ncd\n\nü=1");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(1), (1, 2));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(6), (3, 1));
        // 'ü' is two bytes, '=' is the second char of line 4
        assert_eq!(index.position(9), (4, 2));
        assert_eq!(index.position(999), (4, 4));
    }

    #[test]
    fn test_render_all_sorted() {
        let rendered = render_all(
            vec![Diagnostic::new(3, "second"), Diagnostic::new(0, "first")],
            "x;\ny",
        );
        assert_eq!(
            rendered,
            vec!["(1,1): error: first", "(2,1): error: second"]
        );
    }
}
