//! Inline scanner.
//!
//! Greedy, left-to-right scan over one block's text. `memchr` finds the next
//! byte that can open a construct; everything between constructs
//! accumulates into a single text run. Nested constructs (emphasis, link
//! text, HTML inner text) recurse through [`parse_inlines`] so the nesting
//! limit applies to them too.

use std::collections::HashMap;

use html_escape::decode_html_entities;
use memchr::{memchr, memchr3};

use crate::ast::{Attributes, Children, Node};
use crate::html;
use crate::parser::Context;
use crate::plugin;

/// Full-width vertical line opening a ruby base.
const RUBY_BAR: &str = "\u{FF5C}";
/// Double angle brackets around the ruby reading.
const RUBY_OPEN: &str = "\u{300A}";
const RUBY_CLOSE: &str = "\u{300B}";
/// First UTF-8 byte of `RUBY_BAR`.
const RUBY_LEAD: u8 = 0xEF;

/// Parse inline nodes from a block's text.
pub(crate) fn parse_inlines(text: &str, ctx: &mut Context<'_>) -> Vec<Node> {
    if text.is_empty() {
        return Vec::new();
    }
    if !ctx.enter() {
        return vec![Node::text(text)];
    }

    let nodes = InlineParser::new(text, ctx).parse();
    ctx.leave();
    nodes
}

/// Append text, merging with a trailing text leaf.
pub(crate) fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    match nodes.last_mut() {
        Some(Node::Text(last)) => last.push_str(text),
        _ => nodes.push(Node::text(text)),
    }
}

/// Append a node, merging text leaves.
pub(crate) fn push_node(nodes: &mut Vec<Node>, node: Node) {
    match node {
        Node::Text(t) => push_text(nodes, &t),
        element => nodes.push(element),
    }
}

#[inline(always)]
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b >= 0x80
}

#[inline(always)]
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n')
}

struct InlineParser<'a, 'c, 'p> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Start of the pending plain-text run.
    text_start: usize,
    nodes: Vec<Node>,
    ctx: &'c mut Context<'p>,
    /// HTML close tags, paired on first use.
    closes: Option<html::CloseIndex>,
    /// Matching `]` / `)` for each `[` / `(`, paired on first use.
    brackets: Option<HashMap<usize, Option<usize>>>,
    /// Content start and line end of the last failed emphasis search, per
    /// delimiter kind. No closer exists after that point on that line.
    failed_delims: [Option<(usize, usize)>; 4],
}

impl<'a, 'c, 'p> InlineParser<'a, 'c, 'p> {
    #[inline]
    fn new(text: &'a str, ctx: &'c mut Context<'p>) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            text_start: 0,
            nodes: Vec::with_capacity(8),
            ctx,
            closes: None,
            brackets: None,
            failed_delims: [None; 4],
        }
    }

    fn parse(mut self) -> Vec<Node> {
        while self.pos < self.bytes.len() {
            let next_special = self.find_next_special();

            if next_special >= self.bytes.len() {
                break;
            }

            self.pos = next_special;

            let parsed = match self.bytes[self.pos] {
                b'\\' => self.try_parse_escape(),
                RUBY_LEAD => self.try_parse_ruby(),
                b'<' => self.try_parse_html(),
                b'@' => self.try_parse_plugin(),
                b'*' | b'_' => self.try_parse_emphasis(),
                b'`' => self.try_parse_code_span(),
                b'[' => self.try_parse_link(),
                b'!' => self.try_parse_image(),
                _ => false,
            };

            if !parsed {
                self.pos += 1;
            }
        }

        self.pos = self.bytes.len();
        self.flush_text();
        self.nodes
    }

    #[inline(always)]
    fn find_next_special(&self) -> usize {
        let remaining = &self.bytes[self.pos..];

        [
            memchr3(b'*', b'_', b'`', remaining),
            memchr3(b'[', b'!', b'<', remaining),
            memchr3(b'@', b'\\', RUBY_LEAD, remaining),
        ]
        .into_iter()
        .flatten()
        .min()
        .map_or(self.bytes.len(), |offset| self.pos + offset)
    }

    /// Byte offset of the end of the line containing `from`.
    #[inline(always)]
    fn line_end(&self, from: usize) -> usize {
        memchr(b'\n', &self.bytes[from..]).map_or(self.bytes.len(), |offset| from + offset)
    }

    /// Emit the pending text run up to the cursor.
    #[inline]
    fn flush_text(&mut self) {
        if self.text_start < self.pos {
            let text = self.text;
            let run = decode_html_entities(&text[self.text_start..self.pos]);
            push_text(&mut self.nodes, &run);
        }
        self.text_start = self.pos;
    }

    /// Emit a finished construct that ends at `end`.
    #[inline]
    fn emit(&mut self, node: Node, end: usize) {
        push_node(&mut self.nodes, node);
        self.pos = end;
        self.text_start = end;
    }

    #[inline]
    fn parse_nested(&mut self, inner: &str) -> Vec<Node> {
        parse_inlines(inner, self.ctx)
    }

    #[inline]
    fn try_parse_escape(&mut self) -> bool {
        match self.bytes.get(self.pos + 1) {
            Some(b) if b.is_ascii_punctuation() => {
                self.flush_text();
                // Kept as is, without entity decoding.
                let text = self.text;
                push_text(&mut self.nodes, &text[self.pos + 1..self.pos + 2]);
                self.pos += 2;
                self.text_start = self.pos;
                true
            }
            _ => false,
        }
    }

    /// `｜base《reading》`
    fn try_parse_ruby(&mut self) -> bool {
        let text = self.text;
        let Some(after_bar) = text[self.pos..].strip_prefix(RUBY_BAR) else {
            return false;
        };
        let Some(open) = after_bar.find(RUBY_OPEN) else {
            return false;
        };
        let base = &after_bar[..open];
        if base.is_empty() || base.contains('\n') || base.contains(RUBY_BAR) {
            return false;
        }

        let after_open = &after_bar[open + RUBY_OPEN.len()..];
        let Some(close) = after_open.find(RUBY_CLOSE) else {
            return false;
        };
        let reading = &after_open[..close];
        if reading.is_empty() || reading.contains('\n') {
            return false;
        }

        let end = self.pos + RUBY_BAR.len() + open + RUBY_OPEN.len() + close + RUBY_CLOSE.len();
        self.flush_text();
        let ruby = Node::element(
            "ruby",
            None,
            vec![Node::text(base), Node::element("rt", None, Node::text(reading))],
        );
        self.emit(ruby, end);
        true
    }

    fn try_parse_html(&mut self) -> bool {
        let text = self.text;
        let Some(tag) = html::parse_open_tag(text, self.pos) else {
            return false;
        };

        if tag.is_standalone() {
            self.flush_text();
            let end = tag.end;
            self.emit(
                Node::element(tag.name, tag.attrs.into_option(), Children::Empty),
                end,
            );
            return true;
        }

        let Some((close_start, close_end)) = self
            .closes
            .get_or_insert_with(|| html::CloseIndex::build(text))
            .find(text, tag.end, &tag.name)
        else {
            return false;
        };
        let inner = &text[tag.end..close_start];

        self.flush_text();
        let children = if html::is_raw_text(&tag.name) {
            let mut raw = Vec::new();
            push_text(&mut raw, inner);
            raw
        } else {
            self.parse_nested(inner)
        };
        self.emit(
            Node::element(tag.name, tag.attrs.into_option(), children),
            close_end,
        );
        true
    }

    fn try_parse_plugin(&mut self) -> bool {
        let text = self.text;
        let Some(call) = plugin::parse_call(text, self.pos) else {
            return false;
        };

        match self.ctx.plugins().dispatch(call.name, call.args, &[]) {
            Some(output) => {
                self.flush_text();
                self.emit(output.into_node(), call.end);
            }
            // Unknown name: the whole call stays in the pending text run.
            None => self.pos = call.end,
        }
        true
    }

    fn try_parse_emphasis(&mut self) -> bool {
        let delim = self.bytes[self.pos];

        if delim == b'_' && self.pos > 0 && is_word_byte(self.bytes[self.pos - 1]) {
            return false;
        }

        if self.bytes.get(self.pos + 1) == Some(&delim) {
            self.try_parse_delimited(delim, 2, "strong")
        } else {
            self.try_parse_delimited(delim, 1, "em")
        }
    }

    /// Match `width` delimiters at the cursor with a closing run on the same line.
    fn try_parse_delimited(&mut self, delim: u8, width: usize, tag: &str) -> bool {
        let start = self.pos;
        let content_start = start + width;
        let line_end = self.line_end(start);

        if content_start >= line_end || is_space(self.bytes[content_start]) {
            return false;
        }

        let slot = usize::from(delim == b'_') * 2 + width - 1;
        if let Some((from, end)) = self.failed_delims[slot] {
            if end == line_end && content_start >= from {
                return false;
            }
        }

        let mut search = content_start;
        while let Some(offset) = memchr(delim, &self.bytes[search..line_end]) {
            let hit = search + offset;
            let run = self.bytes[hit..line_end]
                .iter()
                .take_while(|&&b| b == delim)
                .count();

            let flanked = hit > content_start && !is_space(self.bytes[hit - 1]);
            let run_fits = if width == 2 { run >= 2 } else { run == 1 };

            if flanked && run_fits {
                // For `***`, the extra delimiter belongs to the content.
                let close = hit + run - width;
                let after = close + width;
                let intraword = delim == b'_'
                    && self.bytes.get(after).copied().is_some_and(is_word_byte);

                if !intraword {
                    let text = self.text;
                    let inner = &text[content_start..close];
                    self.flush_text();
                    let children = self.parse_nested(inner);
                    self.emit(Node::element(tag, None, children), after);
                    return true;
                }
            }

            search = hit + run;
        }

        self.failed_delims[slot] = Some((content_start, line_end));
        false
    }

    fn try_parse_code_span(&mut self) -> bool {
        let start = self.pos;
        let line_end = self.line_end(start);
        let run = self.bytes[start..line_end]
            .iter()
            .take_while(|&&b| b == b'`')
            .count();

        let mut search = start + run;
        while let Some(offset) = memchr(b'`', &self.bytes[search..line_end]) {
            let hit = search + offset;
            let close_run = self.bytes[hit..line_end]
                .iter()
                .take_while(|&&b| b == b'`')
                .count();

            if close_run == run {
                let text = self.text;
                let raw = &text[start + run..hit];
                let content = if raw.len() >= 2
                    && raw.starts_with(' ')
                    && raw.ends_with(' ')
                    && !raw.bytes().all(|b| b == b' ')
                {
                    &raw[1..raw.len() - 1]
                } else {
                    raw
                };

                self.flush_text();
                self.emit(Node::element("code", None, Node::text(content)), hit + close_run);
                return true;
            }
            search = hit + close_run;
        }

        // Unmatched: the whole run is literal text.
        self.pos = start + run;
        true
    }

    /// Find the byte matching the `[` or `(` at `open`, on the same line.
    fn find_matching(&mut self, open: usize) -> Option<usize> {
        let bytes = self.bytes;
        let pairs = self.brackets.get_or_insert_with(|| pair_brackets(bytes));
        match pairs.get(&open) {
            Some(close) => *close,
            None => {
                let close_byte = if bytes[open] == b'[' { b']' } else { b')' };
                self.scan_matching(open, bytes[open], close_byte)
            }
        }
    }

    /// Direct scan for brackets the pairing pass saw as escaped.
    fn scan_matching(&self, open: usize, open_byte: u8, close_byte: u8) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = open;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\n' => return None,
                b'\\' => i += 1,
                b if b == open_byte => depth += 1,
                b if b == close_byte => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// `[label](dest "title")` starting at `open`.
    ///
    /// Returns the label, destination, optional title, and end offset.
    #[allow(clippy::type_complexity)]
    fn parse_link_parts(&mut self, open: usize) -> Option<(&'a str, &'a str, Option<&'a str>, usize)> {
        let label_end = self.find_matching(open)?;
        let dest_open = label_end + 1;
        if self.bytes.get(dest_open) != Some(&b'(') {
            return None;
        }
        let dest_close = self.find_matching(dest_open)?;

        let text = self.text;
        let label = &text[open + 1..label_end];
        let (dest, title) = split_title(text[dest_open + 1..dest_close].trim());
        Some((label, dest, title, dest_close + 1))
    }

    fn try_parse_link(&mut self) -> bool {
        let Some((label, dest, title, end)) = self.parse_link_parts(self.pos) else {
            return false;
        };

        let mut attrs = Attributes::new().with("href", decode_html_entities(dest));
        if let Some(title) = title {
            attrs.insert("title", decode_html_entities(title));
        }

        self.flush_text();
        let children = self.parse_nested(label);
        self.emit(Node::element("a", Some(attrs), children), end);
        true
    }

    fn try_parse_image(&mut self) -> bool {
        if self.bytes.get(self.pos + 1) != Some(&b'[') {
            return false;
        }
        let Some((alt, src, title, end)) = self.parse_link_parts(self.pos + 1) else {
            return false;
        };

        let mut attrs = Attributes::new()
            .with("src", decode_html_entities(src))
            .with("alt", decode_html_entities(alt));
        if let Some(title) = title {
            attrs.insert("title", decode_html_entities(title));
        }

        self.flush_text();
        self.emit(Node::element("img", Some(attrs), Children::Empty), end);
        true
    }
}

/// Pair every `[` with its `]` and every `(` with its `)` within a line.
///
/// Unmatched openers map to `None`. A backslash hides the next byte.
fn pair_brackets(bytes: &[u8]) -> HashMap<usize, Option<usize>> {
    let mut pairs = HashMap::new();
    let mut squares: Vec<usize> = Vec::new();
    let mut parens: Vec<usize> = Vec::new();

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                squares.clear();
                parens.clear();
            }
            b'\\' => i += 1,
            b'[' => {
                pairs.insert(i, None);
                squares.push(i);
            }
            b'(' => {
                pairs.insert(i, None);
                parens.push(i);
            }
            b']' => {
                if let Some(open) = squares.pop() {
                    pairs.insert(open, Some(i));
                }
            }
            b')' => {
                if let Some(open) = parens.pop() {
                    pairs.insert(open, Some(i));
                }
            }
            _ => {}
        }
        i += 1;
    }

    pairs
}

/// Split `url "title"` into its parts.
fn split_title(dest: &str) -> (&str, Option<&str>) {
    if dest.len() >= 2 && dest.ends_with('"') {
        if let Some(quote) = dest.find(" \"") {
            let title_start = quote + 2;
            let title_end = dest.len() - 1;
            if title_start <= title_end {
                return (dest[..quote].trim_end(), Some(&dest[title_start..title_end]));
            }
        }
    }
    (dest, None)
}
