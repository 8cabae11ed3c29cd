//! Manifest parse diagnostics (spec §4.D).
//!
//! Shaped the same way as [`crate::anchor`]'s (now-retired) `BadAnchorError`:
//! a `thiserror`+`miette::Diagnostic` struct carrying the offending source
//! text, a computed [`SourceSpan`], and a human help string, so manifest
//! errors render through `ariadne` with the same texture as every other
//! diagnostic this crate produces.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct ParseError {
    pub file: String,
    pub line: usize,
    pub column: usize,

    #[source_code]
    pub src: String,

    #[label("{label}")]
    pub span: SourceSpan,

    pub label: String,
    pub message: String,

    #[help]
    pub help: Option<String>,
}

impl ParseError {
    pub fn new(
        file: impl Into<String>,
        src: &str,
        line: usize,
        column: usize,
        label: impl Into<String>,
        message: impl Into<String>,
        help: Option<String>,
    ) -> Self {
        let span = span_for(src, line, column);
        Self {
            file: file.into(),
            line,
            column,
            src: src.to_string(),
            span,
            label: label.into(),
            message: message.into(),
            help,
        }
    }
}

/// Convert a 1-based (line, column) into a byte-offset [`SourceSpan`]
/// covering the rest of that line, the same technique
/// `line_to_byte_offset` used for anchor diagnostics.
fn span_for(src: &str, line: usize, column: usize) -> SourceSpan {
    let mut current_line = 1;
    let mut line_start = 0;
    for (byte_idx, ch) in src.char_indices() {
        if current_line == line {
            let line_end = src[byte_idx..]
                .find('\n')
                .map(|n| byte_idx + n)
                .unwrap_or(src.len());
            let offset = (byte_idx + column.saturating_sub(1)).min(line_end);
            let len = line_end.saturating_sub(offset).max(1);
            return (offset, len).into();
        }
        if ch == '\n' {
            current_line += 1;
            line_start = byte_idx + 1;
        }
    }
    (line_start, 1).into()
}
