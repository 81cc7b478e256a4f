//! Block segmenter and parser entry point.
//!
//! Segmentation borrows lines from the input; nodes own their text. Nested
//! bodies (blockquotes, list items, HTML blocks, plugin bodies) are rebuilt
//! as dedented strings and segmented recursively with the same [`Context`],
//! so one depth counter bounds every kind of nesting.

use log::{trace, warn};

use crate::ast::{Attributes, Children, Node};
use crate::error::ParseError;
use crate::export::{ExportStrategy, Exported};
use crate::html;
use crate::inline::parse_inlines;
use crate::lexer::{dedent, Lexer, Line};
use crate::plugin::{self, PluginOutput, PluginRegistry};

/// Default bound on nested blocks and inline constructs.
pub const DEFAULT_MAX_NESTING: usize = 64;

/// Indentation of plugin bodies and nested list content, in columns.
const INDENT_UNIT: usize = 2;

const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Output representation.
    pub export: ExportStrategy,
    /// Plugins available to `@[name:args]` calls.
    pub plugins: PluginRegistry,
    /// Maximum nesting depth before the parse fails.
    pub max_nesting: usize,
    /// Optional cap on input size in bytes.
    pub max_input_bytes: Option<usize>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            export: ExportStrategy::Html,
            plugins: PluginRegistry::new(),
            max_nesting: DEFAULT_MAX_NESTING,
            max_input_bytes: None,
        }
    }
}

impl ParseOptions {
    pub fn with_export(mut self, export: ExportStrategy) -> Self {
        self.export = export;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Set the nesting limit.
    ///
    /// Each level costs stack; very large limits can overflow the stack on
    /// adversarial input before the limit is reached.
    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    pub fn with_max_input_bytes(mut self, limit: usize) -> Self {
        self.max_input_bytes = Some(limit);
        self
    }
}

/// Kanamark parser.
///
/// Immutable after construction; `parse` takes `&self` and a parser can be
/// shared between threads.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    options: ParseOptions,
}

impl Parser {
    /// Create a new parser with the given options.
    #[inline]
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse the input and apply the configured export strategy.
    pub fn parse(&self, input: &str) -> Result<Exported, ParseError> {
        let nodes = self.parse_nodes(input)?;
        Ok(self.options.export.export(nodes))
    }

    /// Parse the input into top-level block nodes.
    pub fn parse_nodes(&self, input: &str) -> Result<Vec<Node>, ParseError> {
        if let Some(limit) = self.options.max_input_bytes {
            if input.len() > limit {
                warn!("input of {} bytes rejected (limit {})", input.len(), limit);
                return Err(ParseError::input_too_large(input.len(), limit));
            }
        }

        let mut ctx = Context::new(&self.options.plugins, self.options.max_nesting);
        let blocks = parse_blocks(input, &mut ctx);

        match ctx.take_error() {
            Some(err) => Err(err),
            None => Ok(blocks),
        }
    }
}

/// Parse `input` with `options` in one call.
pub fn parse(input: &str, options: ParseOptions) -> Result<Exported, ParseError> {
    Parser::new(options).parse(input)
}

/// Per-call parse state shared by the block and inline passes.
pub(crate) struct Context<'p> {
    plugins: &'p PluginRegistry,
    max_nesting: usize,
    depth: usize,
    /// First resource failure; later nesting degrades to literal text.
    error: Option<ParseError>,
}

impl<'p> Context<'p> {
    pub(crate) fn new(plugins: &'p PluginRegistry, max_nesting: usize) -> Self {
        Self {
            plugins,
            max_nesting,
            depth: 0,
            error: None,
        }
    }

    /// Enter one nesting level. `false` means the caller must not recurse.
    pub(crate) fn enter(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.depth >= self.max_nesting {
            warn!("nesting depth limit of {} reached", self.max_nesting);
            self.record_error(ParseError::nesting_too_deep(self.max_nesting));
            return false;
        }
        self.depth += 1;
        true
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    #[inline]
    pub(crate) fn plugins(&self) -> &'p PluginRegistry {
        self.plugins
    }

    #[inline]
    fn record_error(&mut self, error: ParseError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn take_error(&mut self) -> Option<ParseError> {
        self.error.take()
    }
}

/// Segment `input` into block nodes.
pub(crate) fn parse_blocks(input: &str, ctx: &mut Context<'_>) -> Vec<Node> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    if !ctx.enter() {
        return vec![Node::text(input)];
    }

    let mut lexer = Lexer::new(input);
    let blocks = BlockParser::new(&mut *ctx).parse_blocks(&mut lexer);
    ctx.leave();
    blocks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

#[derive(Debug, Clone, Copy)]
struct ListMarker {
    kind: ListKind,
    start: u64,
    /// Bytes taken by the marker and one following space.
    width: usize,
}

/// Lines collected for one list item.
struct ListItem<'a> {
    text: Vec<&'a str>,
    body: Vec<&'a str>,
}

impl<'a> ListItem<'a> {
    fn new(first: &'a str) -> Self {
        Self {
            text: vec![first],
            body: Vec::new(),
        }
    }

    fn push_continuation(&mut self, line: &'a str) {
        if self.body.is_empty() {
            self.text.push(line);
        } else {
            self.body.push(line);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    fn style(self) -> &'static str {
        match self {
            Align::Left => "text-align: left",
            Align::Center => "text-align: center",
            Align::Right => "text-align: right",
        }
    }
}

struct BlockParser<'c, 'p> {
    ctx: &'c mut Context<'p>,
    /// Built on the first HTML block candidate.
    closes: Option<html::CloseIndex>,
}

impl<'c, 'p> BlockParser<'c, 'p> {
    fn new(ctx: &'c mut Context<'p>) -> Self {
        Self { ctx, closes: None }
    }

    fn parse_blocks(&mut self, lexer: &mut Lexer<'_>) -> Vec<Node> {
        let mut blocks = Vec::with_capacity(16);

        while !lexer.is_eof() {
            lexer.skip_blank_lines();

            if lexer.is_eof() {
                break;
            }

            if let Some(block) = self.parse_block(lexer) {
                blocks.push(block);
            }
        }

        blocks
    }

    fn parse_block(&mut self, lexer: &mut Lexer<'_>) -> Option<Node> {
        let line = *lexer.peek_line()?;
        let content = line.content();

        if content.starts_with('<') {
            if let Some(node) = self.parse_html_block(lexer, line) {
                trace!("html block at line offset {}", line.offset);
                return Some(node);
            }
        }
        if content.starts_with("@[") {
            if let Some(node) = self.parse_plugin_block(lexer, line) {
                return Some(node);
            }
        }
        if let Some(ticks) = fence_len(content) {
            trace!("code fence at line offset {}", line.offset);
            return Some(self.parse_code_fence(lexer, line, ticks));
        }
        if let Some(level) = atx_level(content) {
            return Some(self.parse_atx_heading(lexer, line, level));
        }
        if is_thematic_break(content) {
            lexer.next_line();
            return Some(Node::element("hr", None, Children::Empty));
        }
        if content.starts_with('>') {
            return Some(self.parse_blockquote(lexer));
        }
        if let Some(marker) = list_marker(content) {
            trace!("list at line offset {}", line.offset);
            return Some(self.parse_list(lexer, marker));
        }
        if let Some((header, aligns)) = table_start(lexer) {
            trace!("table at line offset {}", line.offset);
            return Some(self.parse_table(lexer, &header, &aligns));
        }

        self.parse_paragraph(lexer)
    }

    /// True when `content` opens a block that ends a paragraph or list item.
    fn starts_block(&self, content: &str) -> bool {
        fence_len(content).is_some()
            || atx_level(content).is_some()
            || is_thematic_break(content)
            || content.starts_with('>')
            || starts_html_block(content)
            || self.is_plugin_line(content)
    }

    /// A line holding exactly one call to a registered plugin.
    fn is_plugin_line(&self, content: &str) -> bool {
        let content = content.trim_end();
        plugin::parse_call(content, 0)
            .is_some_and(|call| call.end == content.len() && self.ctx.plugins().contains(call.name))
    }

    fn heading(&mut self, level: usize, text: &str) -> Node {
        let tag = HEADING_TAGS[level.clamp(1, 6) - 1];
        Node::element(tag, None, parse_inlines(text, self.ctx))
    }

    fn parse_html_block(&mut self, lexer: &mut Lexer<'_>, line: Line<'_>) -> Option<Node> {
        let input = lexer.input();
        let start = line.offset + (line.text.len() - line.content().len());
        let tag = html::parse_open_tag(input, start)?;
        if !html::is_block_tag(&tag.name) {
            return None;
        }

        if tag.is_standalone() {
            if tag.end > line.end() || !input[tag.end..line.end()].trim().is_empty() {
                return None;
            }
            lexer.next_line();
            return Some(Node::element(tag.name, tag.attrs.into_option(), Children::Empty));
        }

        let (close_start, close_end) = self
            .closes
            .get_or_insert_with(|| html::CloseIndex::build(input))
            .find(input, tag.end, &tag.name)?;

        // The closing tag must end its line.
        let mut last = 0;
        loop {
            let candidate = lexer.peek_nth(last)?;
            if candidate.end() >= close_end {
                if !input[close_end..candidate.end()].trim().is_empty() {
                    return None;
                }
                break;
            }
            last += 1;
        }
        lexer.advance(last + 1);

        let inner = &input[tag.end..close_start];
        let children = if html::is_raw_text(&tag.name) {
            if inner.is_empty() {
                Vec::new()
            } else {
                vec![Node::text(inner)]
            }
        } else if tag.name == "pre" || !inner.contains('\n') {
            parse_inlines(inner, self.ctx)
        } else {
            parse_blocks(inner, self.ctx)
        };

        Some(Node::element(tag.name, tag.attrs.into_option(), children))
    }

    fn parse_plugin_block(&mut self, lexer: &mut Lexer<'_>, line: Line<'_>) -> Option<Node> {
        let call_text = line.trimmed();
        let call = plugin::parse_call(call_text, 0)?;
        if call.end != call_text.len() || !self.ctx.plugins().contains(call.name) {
            return None;
        }

        // Body: following blank or indented lines, without trailing blanks.
        let body_indent = line.indent() + INDENT_UNIT;
        let mut body_len = 0;
        let mut n = 1;
        while let Some(next) = lexer.peek_nth(n) {
            if !next.is_blank() {
                if next.indent() < body_indent {
                    break;
                }
                body_len = n;
            }
            n += 1;
        }

        let body: Vec<&str> = (1..=body_len)
            .filter_map(|i| lexer.peek_nth(i))
            .map(|l| dedent(l.text, body_indent))
            .collect();
        lexer.advance(body_len + 1);

        trace!("plugin block '{}' with {} body lines", call.name, body.len());
        let content = if body.is_empty() {
            Vec::new()
        } else {
            parse_blocks(&body.join("\n"), self.ctx)
        };

        let output = self.ctx.plugins().dispatch(call.name, call.args, &content);
        Some(output.map_or_else(|| Node::text(call_text), PluginOutput::into_node))
    }

    fn parse_code_fence(&mut self, lexer: &mut Lexer<'_>, open: Line<'_>, ticks: usize) -> Node {
        lexer.next_line();
        let info = open.content()[ticks..].trim();

        let mut body: Vec<&str> = Vec::new();
        while let Some(line) = lexer.next_line() {
            let trimmed = line.trimmed();
            if trimmed.len() >= ticks && trimmed.bytes().all(|b| b == b'`') {
                break;
            }
            body.push(line.text);
        }

        let attrs = info
            .split_whitespace()
            .next()
            .map(|lang| Attributes::new().with("class", format!("language-{}", lang)));
        let code = Node::element("code", attrs, Node::text(body.join("\n")));
        Node::element("pre", None, code)
    }

    fn parse_atx_heading(&mut self, lexer: &mut Lexer<'_>, line: Line<'_>, level: usize) -> Node {
        lexer.next_line();
        let text = strip_closing_hashes(line.content()[level..].trim());
        self.heading(level, text)
    }

    fn parse_blockquote(&mut self, lexer: &mut Lexer<'_>) -> Node {
        let mut lines: Vec<&str> = Vec::new();

        while let Some(&line) = lexer.peek_line() {
            let Some(rest) = line.content().strip_prefix('>') else {
                break;
            };
            lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            lexer.next_line();
        }

        Node::element("blockquote", None, parse_blocks(&lines.join("\n"), self.ctx))
    }

    fn parse_list(&mut self, lexer: &mut Lexer<'_>, first: ListMarker) -> Node {
        let base = lexer.peek_line().map_or(0, Line::indent);
        let mut items: Vec<Node> = Vec::with_capacity(8);
        let mut current: Option<ListItem<'_>> = None;

        while let Some(&line) = lexer.peek_line() {
            if line.is_blank() {
                break;
            }
            let content = line.content();

            if line.indent() < base + INDENT_UNIT {
                if let Some(marker) = list_marker(content) {
                    if marker.kind != first.kind {
                        break;
                    }
                    if let Some(item) = current.take() {
                        items.push(self.finish_item(item));
                    }
                    current = Some(ListItem::new(content[marker.width..].trim()));
                    lexer.next_line();
                    continue;
                }
                if self.starts_block(content) {
                    break;
                }
                match current.as_mut() {
                    Some(item) => item.push_continuation(content.trim_end()),
                    None => break,
                }
            } else {
                let Some(item) = current.as_mut() else {
                    break;
                };
                let nested = dedent(line.text, base + INDENT_UNIT);
                let nested_content = nested.trim_start();
                if item.body.is_empty()
                    && !self.starts_block(nested_content)
                    && list_marker(nested_content).is_none()
                {
                    item.text.push(line.trimmed());
                } else {
                    item.body.push(nested);
                }
            }
            lexer.next_line();
        }

        if let Some(item) = current.take() {
            items.push(self.finish_item(item));
        }

        match first.kind {
            ListKind::Unordered => Node::element("ul", None, items),
            ListKind::Ordered => {
                let attrs = (first.start != 1)
                    .then(|| Attributes::new().with("start", first.start.to_string()));
                Node::element("ol", attrs, items)
            }
        }
    }

    fn finish_item(&mut self, item: ListItem<'_>) -> Node {
        let mut children = parse_inlines(&item.text.join("\n"), self.ctx);
        if !item.body.is_empty() {
            children.extend(parse_blocks(&item.body.join("\n"), self.ctx));
        }
        Node::element("li", None, children)
    }

    fn parse_table(&mut self, lexer: &mut Lexer<'_>, header: &[&str], aligns: &[Option<Align>]) -> Node {
        lexer.advance(2);

        let head = self.table_row("th", header, aligns);
        let mut rows: Vec<Node> = Vec::new();
        while let Some(&line) = lexer.peek_line() {
            let Some(cells) = split_row(line.trimmed()) else {
                break;
            };
            rows.push(self.table_row("td", &cells, aligns));
            lexer.next_line();
        }

        let mut sections = vec![Node::element("thead", None, head)];
        if !rows.is_empty() {
            sections.push(Node::element("tbody", None, rows));
        }
        Node::element("table", None, sections)
    }

    /// Build a row with exactly one cell per column.
    fn table_row(&mut self, cell_tag: &str, cells: &[&str], aligns: &[Option<Align>]) -> Node {
        let mut row = Vec::with_capacity(aligns.len());
        for (i, align) in aligns.iter().enumerate() {
            let text = cells.get(i).copied().unwrap_or("");
            let attrs = align.map(|a| Attributes::new().with("style", a.style()));
            row.push(Node::element(cell_tag, attrs, parse_inlines(text, self.ctx)));
        }
        Node::element("tr", None, row)
    }

    fn parse_paragraph(&mut self, lexer: &mut Lexer<'_>) -> Option<Node> {
        let mut lines: Vec<&str> = Vec::new();

        while let Some(&line) = lexer.peek_line() {
            if line.is_blank() || (!lines.is_empty() && self.interrupts_paragraph(lexer)) {
                break;
            }
            lines.push(line.trimmed());
            lexer.next_line();

            if let Some(level) = lexer.peek_line().and_then(|next| setext_level(next.text)) {
                lexer.next_line();
                return Some(self.heading(level, &lines.join("\n")));
            }
        }

        if lines.is_empty() {
            return None;
        }
        Some(Node::element("p", None, parse_inlines(&lines.join("\n"), self.ctx)))
    }

    fn interrupts_paragraph(&self, lexer: &Lexer<'_>) -> bool {
        let Some(line) = lexer.peek_line() else {
            return false;
        };
        let content = line.content();
        self.starts_block(content) || list_marker(content).is_some() || table_start(lexer).is_some()
    }
}

/// Opening fence length, if `content` opens a code fence.
fn fence_len(content: &str) -> Option<usize> {
    let ticks = content.bytes().take_while(|&b| b == b'`').count();
    (ticks >= 3 && !content[ticks..].contains('`')).then_some(ticks)
}

fn atx_level(content: &str) -> Option<usize> {
    let level = content.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    match content.as_bytes().get(level) {
        None | Some(b' ' | b'\t') => Some(level),
        _ => None,
    }
}

/// Drop an optional closing `###` sequence.
fn strip_closing_hashes(text: &str) -> &str {
    let without = text.trim_end_matches('#');
    if without.is_empty() {
        ""
    } else if without.ends_with(|c: char| c == ' ' || c == '\t') {
        without.trim_end()
    } else {
        text
    }
}

fn setext_level(text: &str) -> Option<usize> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.bytes().all(|b| b == b'=') {
        Some(1)
    } else if trimmed.bytes().all(|b| b == b'-') {
        Some(2)
    } else {
        None
    }
}

fn is_thematic_break(content: &str) -> bool {
    let mut marker = None;
    let mut count = 0;
    for b in content.bytes() {
        match b {
            b' ' | b'\t' => {}
            b'-' | b'*' | b'_' if marker.is_none() || marker == Some(b) => {
                marker = Some(b);
                count += 1;
            }
            _ => return false,
        }
    }
    count >= 3
}

fn starts_html_block(content: &str) -> bool {
    content.starts_with('<')
        && html::parse_open_tag(content, 0).is_some_and(|tag| html::is_block_tag(&tag.name))
}

fn list_marker(content: &str) -> Option<ListMarker> {
    let bytes = content.as_bytes();
    let (kind, start, len) = match *bytes.first()? {
        b'-' | b'*' => (ListKind::Unordered, 1, 1),
        b'0'..=b'9' => {
            let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            if digits > 9 || bytes.get(digits) != Some(&b'.') {
                return None;
            }
            (ListKind::Ordered, content[..digits].parse().ok()?, digits + 1)
        }
        _ => return None,
    };

    match bytes.get(len) {
        None => Some(ListMarker { kind, start, width: len }),
        Some(b' ' | b'\t') => Some(ListMarker {
            kind,
            start,
            width: len + 1,
        }),
        _ => None,
    }
}

/// Header cells and column alignments when the next two lines open a table.
fn table_start<'a>(lexer: &Lexer<'a>) -> Option<(Vec<&'a str>, Vec<Option<Align>>)> {
    let header = split_row(lexer.peek_nth(0)?.trimmed())?;
    let aligns = parse_separator(lexer.peek_nth(1)?.trimmed(), header.len())?;
    Some((header, aligns))
}

/// Split `| a | b |` into trimmed cells. `\|` does not split.
fn split_row(text: &str) -> Option<Vec<&str>> {
    let inner = text.strip_prefix('|')?;
    let inner = match inner.strip_suffix('|') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => inner,
    };

    let bytes = inner.as_bytes();
    let mut cells = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'|' => {
                cells.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    cells.push(inner[start.min(inner.len())..].trim());
    Some(cells)
}

fn parse_separator(text: &str, columns: usize) -> Option<Vec<Option<Align>>> {
    let cells = split_row(text)?;
    if cells.len() != columns {
        return None;
    }

    cells
        .into_iter()
        .map(|cell| {
            let left = cell.starts_with(':');
            let right = cell.len() > 1 && cell.ends_with(':');
            let dashes = cell.trim_start_matches(':').trim_end_matches(':');
            if dashes.is_empty() || !dashes.bytes().all(|b| b == b'-') {
                return None;
            }
            Some(match (left, right) {
                (true, true) => Some(Align::Center),
                (true, false) => Some(Align::Left),
                (false, true) => Some(Align::Right),
                (false, false) => None,
            })
        })
        .collect()
}
