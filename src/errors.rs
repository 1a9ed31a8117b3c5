//! Syntax errors with source locations.
//!
//! The whole front end reports exactly one error kind: a [`SyntaxError`]
//! carrying a message and the 1-indexed line/column it occurred at. The
//! first error wins; later stages never overwrite it.
//!
//! [`RichSyntaxError`] is the terminal-friendly form. It uses miette to
//! render the error against the source text with an underlined span, which
//! requires converting the line/column location back to a byte offset.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// A 1-indexed (line, column) position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexical or parse error with its source location.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{location}: Syntax error: {message}.")]
pub struct SyntaxError {
    pub message: String,
    pub location: SourceLocation,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Attach the source text, producing a diagnostic that renders the
    /// offending line with an underline.
    pub fn with_source(self, src: &str) -> RichSyntaxError {
        let offset = byte_offset(src, self.location);
        RichSyntaxError {
            message: self.message,
            src: src.to_string(),
            span: (offset, 1.min(src.len().saturating_sub(offset))).into(),
            label: format!("at {}", self.location),
        }
    }
}

/// A [`SyntaxError`] bundled with the source it points into, for terminal
/// rendering via miette.
#[derive(Error, Debug, Diagnostic)]
#[error("Syntax error: {message}")]
pub struct RichSyntaxError {
    pub message: String,

    #[source_code]
    src: String,

    #[label("{label}")]
    span: SourceSpan,

    label: String,
}

/// Map a 1-indexed line/column location to a byte offset into `src`.
/// Columns count characters, matching the lexer's location tracking.
/// Locations past the end of the text map to `src.len()`.
fn byte_offset(src: &str, loc: SourceLocation) -> usize {
    let mut line = 1u32;
    let mut column = 1u32;
    for (offset, ch) in src.char_indices() {
        if line == loc.line && column == loc.column {
            return offset;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    src.len()
}
