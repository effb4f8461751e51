//! Diagnostic rendering and reporting.
//!
//! Every error or warning the front-end raises goes through this module: a
//! [`Diagnostic`] resolves a source position to a `file:line:col:` prefix,
//! attaches two lines of context before and after the offending line with a
//! caret under the column, and is handed to a [`Sink`]. The default sink is
//! fail-fast: the first error becomes a [`CoreError`] and aborts the run.
//! Keeping the sink behind a trait means a future multi-error mode only has
//! to swap the sink, not touch any checking logic.

use std::fmt::{self, Display, Formatter};

use crate::error::CoreError;

/// Distinguishes the severities and styles a diagnostic can render with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Lexical error: malformed literal, unterminated string or comment,
    /// invalid byte.
    Lex,
    /// Syntax error: unexpected token.
    Parse,
    /// Semantic error: unknown name, redefinition, type mismatch,
    /// immutable mutation, unused variable or import.
    Type,
    /// Non-fatal by default; promoted to fatal in production mode.
    Warning,
}

/// ANSI styling applied when rendering parts of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    None,
    Highlight,
    Error,
    Warning,
}

/// Wraps a value so that its `Display` output is colored.
#[derive(Debug, Clone, Copy)]
pub struct Colored<T> {
    value: T,
    color: Color,
}

impl<T> Colored<T> {
    pub fn new(value: T, color: Color) -> Self {
        Colored { value, color }
    }
}

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let code = match self.color {
            Color::None => return self.value.fmt(f),
            Color::Highlight => "\x1b[1;36m",
            Color::Error => "\x1b[1;31m",
            Color::Warning => "\x1b[1;33m",
        };
        write!(f, "{}{}\x1b[0m", code, self.value)
    }
}

/// A single fully resolved diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: String,
    /// 1-based source line.
    pub line: u32,
    /// 1-based column of the offending token.
    pub col: u32,
    /// Pre-rendered context block (two lines before/after plus caret).
    pub context: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        file: &str,
        source: &str,
        line: u32,
        col: u32,
    ) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            file: file.to_string(),
            line,
            col,
            context: render_context(source, line, col),
        }
    }

    /// The full user-facing text: prefix line plus context block.
    pub fn rendered(&self) -> String {
        let label = match self.severity {
            Severity::Lex | Severity::Parse | Severity::Type => "error",
            Severity::Warning => "warning",
        };
        format!(
            "{}:{}:{}: {}: {}\n{}",
            self.file, self.line, self.col, label, self.message, self.context
        )
    }

    fn into_error(self) -> CoreError {
        let message = self.rendered();
        match self.severity {
            Severity::Lex => CoreError::Lex { message },
            Severity::Parse => CoreError::Parse { message },
            Severity::Type => CoreError::Type { message },
            Severity::Warning => CoreError::Warning { message },
        }
    }
}

/// Renders the source context block for a position: up to two lines before
/// and after the offending line, with a caret marking the column.
pub fn render_context(source: &str, line: u32, col: u32) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() || line == 0 {
        return String::new();
    }
    let line_idx = (line as usize - 1).min(lines.len().saturating_sub(1));
    let first = line_idx.saturating_sub(2);
    let last = (line_idx + 2).min(lines.len().saturating_sub(1));

    let mut out = String::new();
    for i in first..=last {
        out.push_str(&format!("{:5} | {}\n", i + 1, lines[i]));
        if i == line_idx {
            let mut caret = String::from("      | ");
            for ch in lines[i].chars().take(col.saturating_sub(1) as usize) {
                caret.push(if ch == '\t' { '\t' } else { ' ' });
            }
            caret.push('^');
            out.push_str(&caret);
            out.push('\n');
        }
    }
    out
}

/// Receives diagnostics as the front-end produces them.
///
/// `report` returns `Err` when the diagnostic must abort compilation; the
/// caller propagates that with `?`. Warnings normally pass through.
pub trait Sink {
    fn report(&mut self, diag: Diagnostic) -> Result<(), CoreError>;

    /// Warnings that were reported and not promoted.
    fn warnings(&self) -> &[Diagnostic];
}

/// The default fail-fast sink: the first error aborts; warnings are
/// collected, and promoted to errors when `prod` is set.
#[derive(Debug, Default)]
pub struct FailFast {
    pub prod: bool,
    collected: Vec<Diagnostic>,
}

impl FailFast {
    pub fn new(prod: bool) -> Self {
        FailFast {
            prod,
            collected: Vec::new(),
        }
    }
}

impl Sink for FailFast {
    fn report(&mut self, diag: Diagnostic) -> Result<(), CoreError> {
        match diag.severity {
            Severity::Warning if !self.prod => {
                eprintln!(
                    "{}",
                    Colored::new(diag.rendered(), Color::Warning)
                );
                self.collected.push(diag);
                Ok(())
            }
            _ => Err(diag.into_error()),
        }
    }

    fn warnings(&self) -> &[Diagnostic] {
        &self.collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_marks_offending_column() {
        let src = "fn main() {\n\tx := 1\n}\n";
        let ctx = render_context(src, 2, 2);
        assert!(ctx.contains("    2 | \tx := 1"));
        assert!(ctx.contains("| \t^"), "caret should sit under column 2: {ctx}");
    }

    #[test]
    fn context_clamps_to_file_bounds() {
        let ctx = render_context("only line\n", 1, 1);
        assert_eq!(ctx.lines().count(), 2); // the line itself plus the caret
    }

    #[test]
    fn fail_fast_aborts_on_first_error() {
        let mut sink = FailFast::new(false);
        let diag = Diagnostic::new(Severity::Type, "unknown type `Foo`", "a.cdr", "x := Foo{}\n", 1, 6);
        let err = sink.report(diag).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a.cdr:1:6"));
        assert!(msg.contains("unknown type `Foo`"));
    }

    #[test]
    fn warnings_collect_unless_prod() {
        let mut sink = FailFast::new(false);
        let diag = Diagnostic::new(Severity::Warning, "deprecated", "a.cdr", "switch x {\n", 1, 1);
        sink.report(diag.clone()).unwrap();
        assert_eq!(sink.warnings().len(), 1);

        let mut prod = FailFast::new(true);
        assert!(prod.report(diag).is_err());
    }
}
