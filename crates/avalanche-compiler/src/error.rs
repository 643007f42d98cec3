//! Compile-error accumulator (C1): an append-only, FIFO list of structured
//! errors with source locations, rendered to a human report under a caller
//! supplied line budget.

use std::fmt;
use std::rc::Rc;

/// A location in one source file. Spans union by taking the earlier start
/// and later end, but only when the filenames match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub filename: Rc<str>,
    pub source_text: Rc<str>,
    pub line_offset: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl SourceLocation {
    pub fn new(filename: impl Into<Rc<str>>, source_text: impl Into<Rc<str>>, line: u32, col: u32) -> Self {
        SourceLocation {
            filename: filename.into(),
            source_text: source_text.into(),
            line_offset: 0,
            start_line: line,
            end_line: line,
            start_col: col,
            end_col: col,
        }
    }

    /// Unions two spans, provided they belong to the same file. Returns
    /// `self` unchanged when the filenames differ (the earlier location
    /// wins; callers that need to detect cross-file unions should compare
    /// `filename` themselves first).
    pub fn union(&self, other: &SourceLocation) -> SourceLocation {
        if self.filename != other.filename {
            return self.clone();
        }
        let (start_line, start_col) = if self.start_line < other.start_line
            || (self.start_line == other.start_line && self.start_col <= other.start_col)
        {
            (self.start_line, self.start_col)
        } else {
            (other.start_line, other.start_col)
        };
        let (end_line, end_col) = if self.end_line > other.end_line
            || (self.end_line == other.end_line && self.end_col >= other.end_col)
        {
            (self.end_line, self.end_col)
        } else {
            (other.end_line, other.end_col)
        };
        SourceLocation {
            filename: self.filename.clone(),
            source_text: self.source_text.clone(),
            line_offset: self.line_offset,
            start_line,
            end_line,
            start_col,
            end_col,
        }
    }

    fn excerpt_line(&self, line: u32) -> Option<&str> {
        let idx = line.checked_sub(self.line_offset)?;
        self.source_text.lines().nth(idx as usize)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.filename, self.start_line, self.start_col
        )
    }
}

/// A single accumulated compile error.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl std::error::Error for CompileError {}

/// FIFO accumulator. Insertion order is preserved so the earliest error is
/// always reported first; nothing ever removes an entry once appended.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<CompileError>,
}

impl ErrorList {
    pub fn new() -> Self {
        ErrorList { errors: Vec::new() }
    }

    pub fn push(&mut self, message: impl Into<String>, location: SourceLocation) {
        if self.errors.is_empty() {
            tracing::warn!(location = %location, "first compile error accumulated");
        }
        self.errors.push(CompileError {
            message: message.into(),
            location,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.errors.iter()
    }

    /// Renders the full list to a human report, allocating full context
    /// (filename, source excerpt, caret range) to the earliest errors and
    /// progressively terser forms to later ones until `line_budget` lines
    /// have been used. An overflow summary is appended when truncated.
    pub fn render(&self, line_budget: usize, ansi: bool) -> String {
        let mut out = String::new();
        let mut lines_used = 0usize;
        let mut shown = 0usize;

        for err in &self.errors {
            if lines_used >= line_budget {
                break;
            }
            let remaining = line_budget - lines_used;
            let block = Self::render_one(err, remaining, ansi);
            let block_lines = block.lines().count().max(1);
            out.push_str(&block);
            out.push('\n');
            lines_used += block_lines;
            shown += 1;
        }

        if shown < self.errors.len() {
            out.push_str(&format!(
                "... {} further error(s) omitted\n",
                self.errors.len() - shown
            ));
        }

        out
    }

    fn render_one(err: &CompileError, budget: usize, ansi: bool) -> String {
        let (bold, reset) = if ansi { ("\x1b[1m", "\x1b[0m") } else { ("", "") };
        let header = format!("{bold}{}{reset}: {}", err.location, err.message);
        if budget <= 1 {
            return header;
        }
        match err.location.excerpt_line(err.location.start_line) {
            Some(line) => {
                let caret_col = err.location.start_col.saturating_sub(1) as usize;
                let caret_width = if err.location.start_line == err.location.end_line {
                    (err.location.end_col.saturating_sub(err.location.start_col)).max(1) as usize
                } else {
                    1
                };
                let caret = format!(
                    "{}{}",
                    " ".repeat(caret_col),
                    "^".repeat(caret_width)
                );
                format!("{header}\n  {line}\n  {caret}")
            }
            None => header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, col: u32) -> SourceLocation {
        SourceLocation::new("m.ava", "Foo = 6 + 7\n", line, col)
    }

    #[test]
    fn preserves_insertion_order() {
        let mut errs = ErrorList::new();
        errs.push("first", loc(1, 1));
        errs.push("second", loc(2, 1));
        let collected: Vec<_> = errs.iter().map(|e| e.message.clone()).collect();
        assert_eq!(collected, vec!["first", "second"]);
    }

    #[test]
    fn render_truncates_to_budget_and_reports_overflow() {
        let mut errs = ErrorList::new();
        for i in 0..10 {
            errs.push(format!("err{i}"), loc(1, 1));
        }
        let report = errs.render(3, false);
        assert!(report.contains("further error(s) omitted"));
    }

    #[test]
    fn union_prefers_earlier_start_and_later_end() {
        let a = SourceLocation {
            start_line: 2,
            start_col: 5,
            end_line: 2,
            end_col: 8,
            ..loc(2, 5)
        };
        let b = SourceLocation {
            start_line: 1,
            start_col: 1,
            end_line: 3,
            end_col: 1,
            ..loc(1, 1)
        };
        let u = a.union(&b);
        assert_eq!((u.start_line, u.start_col), (1, 1));
        assert_eq!((u.end_line, u.end_col), (3, 1));
    }

    #[test]
    fn union_across_files_keeps_self() {
        let a = loc(1, 1);
        let mut b = loc(1, 1);
        b.filename = "other.ava".into();
        assert_eq!(a.union(&b), a);
    }
}
