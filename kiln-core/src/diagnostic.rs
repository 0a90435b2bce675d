//! User-facing diagnostics.
//!
//! A `Diagnostic` is the printable form of a `CoreError`: an optional
//! stable code, a message and the span it points at. Rendering is
//! left to the caller so the library itself never writes to a terminal.

use core::fmt::Write as _;

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: Option<&'static str>,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Option<Span>) -> Self {
        Diagnostic {
            code: None,
            message: message.into(),
            span,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    /// Render the diagnostic against the statement it was produced for.
    ///
    /// ```text
    /// error[E0302]: undefined identifier `y`
    ///   | x: i64 = y;
    ///   |          ^
    /// ```
    pub fn render(&self, source: &str) -> String {
        let mut out = String::new();
        match self.code {
            Some(code) => {
                let _ = write!(out, "error[{code}]: {}", self.message);
            }
            None => {
                let _ = write!(out, "error: {}", self.message);
            }
        }

        let Some(span) = self.span else {
            return out;
        };

        let start = (span.start as usize).min(source.len());
        if !source.is_char_boundary(start) {
            return out;
        }
        let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = source[start..].find('\n').map_or(source.len(), |i| start + i);
        let line = source[line_start..line_end].trim_end_matches('\r');
        let width = (span.len() as usize).max(1);
        let _ = write!(out, "\n  | {line}\n  | ");
        for ch in line[..(start - line_start).min(line.len())].chars() {
            out.push(if ch == '\t' { '\t' } else { ' ' });
        }
        for _ in 0..width {
            out.push('^');
        }
        out
    }
}
