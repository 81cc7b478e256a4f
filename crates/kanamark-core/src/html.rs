//! HTML passthrough detection.
//!
//! Recognizes an opening tag at a `<` position, parses its attributes, and
//! finds the matching closing tag with depth counting so nested elements of
//! the same name do not close early. Everything here is a pure scan over the
//! source text; "no match" is `None` and the caller falls back to literal text.

use std::collections::HashMap;

use html_escape::decode_html_entities;
use memchr::memchr;

use crate::ast::Attributes;

/// Elements that never have a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements recognized as the start of an HTML block.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "details",
    "dialog",
    "div",
    "dl",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "script",
    "section",
    "style",
    "summary",
    "table",
    "ul",
];

/// Elements whose content is kept verbatim.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea"];

#[inline]
pub(crate) fn is_void(name: &str) -> bool {
    VOID_TAGS.contains(&name)
}

#[inline]
pub(crate) fn is_block_tag(name: &str) -> bool {
    BLOCK_TAGS.contains(&name)
}

#[inline]
pub(crate) fn is_raw_text(name: &str) -> bool {
    RAW_TEXT_TAGS.contains(&name)
}

/// A parsed opening tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenTag {
    /// Lowercased tag name.
    pub name: String,
    pub attrs: Attributes,
    /// Written as `<name ... />`.
    pub self_closing: bool,
    /// Byte offset just past the closing `>`.
    pub end: usize,
}

impl OpenTag {
    /// True when the tag stands alone without a closing tag.
    #[inline]
    pub fn is_standalone(&self) -> bool {
        self.self_closing || is_void(&self.name)
    }
}

#[inline(always)]
fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

#[inline(always)]
fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

#[inline(always)]
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[inline(always)]
fn is_attr_name_char(b: u8) -> bool {
    !is_space(b) && !matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<')
}

/// Parse an opening tag starting at `at` (which must hold `<`).
pub(crate) fn parse_open_tag(s: &str, at: usize) -> Option<OpenTag> {
    let bytes = s.as_bytes();
    if bytes.get(at) != Some(&b'<') {
        return None;
    }

    let mut i = at + 1;
    if !bytes.get(i).copied().is_some_and(is_name_start) {
        return None;
    }
    let name_start = i;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    let name = s[name_start..i].to_ascii_lowercase();

    // The name must be followed by whitespace, '>' or '/'.
    match bytes.get(i) {
        Some(&b) if is_space(b) || b == b'>' || b == b'/' => {}
        _ => return None,
    }

    let mut attrs = Attributes::new();
    loop {
        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(OpenTag {
                    name,
                    attrs,
                    self_closing: false,
                    end: i + 1,
                });
            }
            b'/' => {
                if bytes.get(i + 1) == Some(&b'>') {
                    return Some(OpenTag {
                        name,
                        attrs,
                        self_closing: true,
                        end: i + 2,
                    });
                }
                return None;
            }
            _ => {}
        }

        let key_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }
        if i == key_start {
            return None;
        }
        let key = &s[key_start..i];

        let mut j = i;
        while j < bytes.len() && is_space(bytes[j]) {
            j += 1;
        }
        if bytes.get(j) != Some(&b'=') {
            attrs.insert(key.to_ascii_lowercase(), "");
            continue;
        }
        j += 1;
        while j < bytes.len() && is_space(bytes[j]) {
            j += 1;
        }

        let (value, next) = match *bytes.get(j)? {
            quote @ (b'"' | b'\'') => {
                let close = memchr(quote, &bytes[j + 1..])?;
                (&s[j + 1..j + 1 + close], j + close + 2)
            }
            _ => {
                let start = j;
                while j < bytes.len() && !is_space(bytes[j]) && bytes[j] != b'>' {
                    j += 1;
                }
                if j == start {
                    return None;
                }
                (&s[start..j], j)
            }
        };
        attrs.insert(key.to_ascii_lowercase(), decode_html_entities(value));
        i = next;
    }
}

/// Parse a closing tag `</name>` at `at` (optional whitespace before `>`).
///
/// Returns the lowercased name and the offset just past the `>`.
fn parse_close_tag(s: &str, at: usize) -> Option<(String, usize)> {
    let bytes = s.as_bytes();
    if !s[at..].starts_with("</") {
        return None;
    }
    let name_start = at + 2;
    if !bytes.get(name_start).copied().is_some_and(is_name_start) {
        return None;
    }
    let mut i = name_start;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    let name = s[name_start..i].to_ascii_lowercase();
    while i < bytes.len() && is_space(bytes[i]) {
        i += 1;
    }
    (bytes.get(i) == Some(&b'>')).then_some((name, i + 1))
}

/// Match `</name>` (case-insensitive) at `at`. `name` must be lowercase.
fn match_close_tag(s: &str, at: usize, name: &str) -> Option<usize> {
    parse_close_tag(s, at)
        .filter(|(close, _)| close == name)
        .map(|(_, end)| end)
}

/// Find the closing tag matching an element opened just before `from`.
///
/// Nested opening tags with the same name increase the depth; each closing
/// tag decreases it. Returns `(close_start, close_end)`.
fn find_close(s: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    let mut depth = 1usize;
    let mut pos = from;

    while let Some(offset) = memchr(b'<', &bytes[pos..]) {
        let lt = pos + offset;
        if let Some(end) = match_close_tag(s, lt, name) {
            depth -= 1;
            if depth == 0 {
                return Some((lt, end));
            }
            pos = end;
            continue;
        }
        if let Some(tag) = parse_open_tag(s, lt) {
            if tag.name == name && !tag.is_standalone() {
                depth += 1;
            }
            pos = tag.end;
            continue;
        }
        pos = lt + 1;
    }

    None
}

/// Close tags for every paired open tag of a text, paired in one pass.
///
/// Pairing uses one stack per tag name, which gives the same answer as
/// [`find_close`] from each open tag without rescanning the rest of the
/// text per attempt.
#[derive(Debug, Default)]
pub(crate) struct CloseIndex {
    /// Open tag end offset, and its close span when one exists.
    pairs: HashMap<usize, Option<(usize, usize)>>,
}

impl CloseIndex {
    pub(crate) fn build(s: &str) -> Self {
        let bytes = s.as_bytes();
        let mut pairs = HashMap::new();
        let mut open: HashMap<String, Vec<usize>> = HashMap::new();
        let mut pos = 0;

        while let Some(offset) = memchr(b'<', &bytes[pos..]) {
            let lt = pos + offset;
            if let Some((name, end)) = parse_close_tag(s, lt) {
                if let Some(opened) = open.get_mut(&name).and_then(Vec::pop) {
                    pairs.insert(opened, Some((lt, end)));
                }
                pos = end;
                continue;
            }
            if let Some(tag) = parse_open_tag(s, lt) {
                if !tag.is_standalone() {
                    pairs.insert(tag.end, None);
                    open.entry(tag.name).or_default().push(tag.end);
                }
                pos = tag.end;
                continue;
            }
            pos = lt + 1;
        }

        Self { pairs }
    }

    /// Close span for the `name` element opened just before `from`.
    ///
    /// Open tags the pairing pass stepped over (inside another tag's
    /// attribute value) fall back to a direct scan.
    pub(crate) fn find(&self, s: &str, from: usize, name: &str) -> Option<(usize, usize)> {
        match self.pairs.get(&from) {
            Some(pair) => *pair,
            None => find_close(s, from, name),
        }
    }
}
