use thiserror::Error;

/// Error kinds for categorizing parse failures.
///
/// Malformed content never fails a parse; every construct degrades to
/// literal text. The only reportable failures are resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Blockquote / list / HTML / plugin / inline nesting went past the limit.
    NestingTooDeep,
    /// Input is larger than the configured byte limit.
    InputTooLarge,
}

/// A resource-exhaustion failure reported by [`Parser::parse`](crate::Parser::parse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    /// Human-readable error message
    pub message: String,
    /// Error categorization
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Create an error for nesting past `limit` levels.
    pub fn nesting_too_deep(limit: usize) -> Self {
        Self {
            message: format!("nesting depth exceeds limit of {}", limit),
            kind: ParseErrorKind::NestingTooDeep,
        }
    }

    /// Create an error for input of `len` bytes over a `limit` byte cap.
    pub fn input_too_large(len: usize, limit: usize) -> Self {
        Self {
            message: format!("input of {} bytes exceeds limit of {} bytes", len, limit),
            kind: ParseErrorKind::InputTooLarge,
        }
    }

    /// Whether this is a nesting-depth failure.
    pub fn is_nesting(&self) -> bool {
        self.kind == ParseErrorKind::NestingTooDeep
    }
}
