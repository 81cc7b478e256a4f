//! Line-based lexer for the block segmenter.
//!
//! Splits input into lines up front using `memchr` for newline detection,
//! then hands them out through a cursor with arbitrary lookahead. Setext
//! headings and table separators both need to see the line after the one
//! being classified.
//!
//! Lines borrow directly from the input.

use memchr::memchr_iter;

/// A single line from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// The line text (without trailing newline or carriage return).
    pub text: &'a str,
    /// Byte offset of the first character in the lexed input.
    pub offset: usize,
}

impl<'a> Line<'a> {
    /// Check if this line contains only whitespace.
    #[inline(always)]
    pub fn is_blank(&self) -> bool {
        self.text.bytes().all(|b| b == b' ' || b == b'\t')
    }

    /// Number of leading indentation columns. A tab counts as four.
    #[inline]
    pub fn indent(&self) -> usize {
        let mut cols = 0;
        for b in self.text.bytes() {
            match b {
                b' ' => cols += 1,
                b'\t' => cols += 4,
                _ => break,
            }
        }
        cols
    }

    /// Line text without leading indentation.
    #[inline(always)]
    pub fn content(&self) -> &'a str {
        self.text.trim_start_matches(|c: char| c == ' ' || c == '\t')
    }

    /// Get the line text with leading/trailing whitespace removed.
    #[inline(always)]
    pub fn trimmed(&self) -> &'a str {
        self.text.trim()
    }

    /// Byte offset one past the last character of this line.
    #[inline(always)]
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

/// Remove up to `cols` columns of leading indentation from `text`.
pub(crate) fn dedent(text: &str, cols: usize) -> &str {
    let mut removed = 0;
    let mut idx = 0;
    for b in text.bytes() {
        if removed >= cols {
            break;
        }
        match b {
            b' ' => removed += 1,
            b'\t' => removed += 4,
            _ => break,
        }
        idx += 1;
    }
    &text[idx..]
}

/// Line cursor for the block segmenter.
pub struct Lexer<'a> {
    /// The complete input text.
    input: &'a str,
    /// All lines, in order.
    lines: Vec<Line<'a>>,
    /// Index of the next unconsumed line.
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        let bytes = input.as_bytes();
        let mut lines = Vec::with_capacity(bytes.len() / 32 + 1);
        let mut start = 0;

        for nl in memchr_iter(b'\n', bytes) {
            lines.push(Self::make_line(input, start, nl));
            start = nl + 1;
        }
        if start < bytes.len() {
            lines.push(Self::make_line(input, start, bytes.len()));
        }

        Self {
            input,
            lines,
            pos: 0,
        }
    }

    #[inline(always)]
    fn make_line(input: &'a str, start: usize, end: usize) -> Line<'a> {
        // Handle CRLF: drop a carriage return right before the newline.
        let text_end = if end > start && input.as_bytes()[end - 1] == b'\r' {
            end - 1
        } else {
            end
        };
        Line {
            text: &input[start..text_end],
            offset: start,
        }
    }

    /// The complete input this lexer was built from.
    #[inline(always)]
    pub fn input(&self) -> &'a str {
        self.input
    }

    /// Check if all input has been consumed.
    #[inline(always)]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.lines.len()
    }

    /// Peek at the next line without consuming it.
    #[inline(always)]
    pub fn peek_line(&self) -> Option<&Line<'a>> {
        self.lines.get(self.pos)
    }

    /// Peek `n` lines ahead (`peek_nth(0)` is `peek_line`).
    #[inline(always)]
    pub fn peek_nth(&self, n: usize) -> Option<&Line<'a>> {
        self.lines.get(self.pos + n)
    }

    /// Consume and return the next line.
    #[inline]
    pub fn next_line(&mut self) -> Option<Line<'a>> {
        let line = self.lines.get(self.pos).copied();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    /// Consume `n` lines at once.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.lines.len());
    }

    /// Skip blank lines and return the count skipped.
    #[inline]
    pub fn skip_blank_lines(&mut self) -> usize {
        let mut count = 0;
        while let Some(line) = self.peek_line() {
            if !line.is_blank() {
                break;
            }
            self.pos += 1;
            count += 1;
        }
        count
    }
}
