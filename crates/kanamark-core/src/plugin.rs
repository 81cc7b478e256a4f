//! Plugin registry and dispatch.
//!
//! Plugins extend the syntax with `@[name:args]` calls. An inline call is
//! replaced by the plugin's output in place. A block call sits alone on its
//! line and may be followed by a body indented by two spaces; the body is
//! dedented, parsed as blocks, and handed to the plugin as `content`.
//!
//! # Example
//!
//! ```
//! use kanamark_core::{ElementMapper, JoinFn, Node, ParseOptions, Parser, PluginOutput, PluginRegistry};
//!
//! let plugins = PluginRegistry::new().register(
//!     "kbd",
//!     |args: &str, _content: &[Node], mapper: &ElementMapper, _join: JoinFn| -> PluginOutput {
//!         mapper.map("kbd", None).children(args).into()
//!     },
//! );
//! let parser = Parser::new(ParseOptions::default().with_plugins(plugins));
//! let html = parser.parse("Press @[kbd:Ctrl]").unwrap().into_html().unwrap();
//! assert_eq!(html, "<p>Press <kbd>Ctrl</kbd></p>");
//! ```
//!
//! Unknown names are not an error: the call text is kept literally.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use memchr::memchr2;

use crate::ast::{Attributes, Children, Node};

/// Concatenates the visible text of a sequence of nodes.
pub type JoinFn = fn(&[Node]) -> String;

/// What a plugin returns: a string or a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutput {
    /// Text spliced in as a text leaf (escaped on HTML export).
    Text(String),
    /// A node spliced in at the call site.
    Node(Node),
}

impl PluginOutput {
    /// Convert into a node.
    pub fn into_node(self) -> Node {
        match self {
            PluginOutput::Text(t) => Node::Text(t),
            PluginOutput::Node(n) => n,
        }
    }
}

impl From<String> for PluginOutput {
    fn from(s: String) -> Self {
        PluginOutput::Text(s)
    }
}

impl From<&str> for PluginOutput {
    fn from(s: &str) -> Self {
        PluginOutput::Text(s.to_string())
    }
}

impl From<Node> for PluginOutput {
    fn from(n: Node) -> Self {
        PluginOutput::Node(n)
    }
}

/// Helper handed to plugins for building elements without touching
/// parser internals.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementMapper {
    _private: (),
}

impl ElementMapper {
    pub(crate) const fn new() -> Self {
        Self { _private: () }
    }

    /// Start an element with `tag` and `attrs`; finish with
    /// [`ElementBuilder::children`] or [`ElementBuilder::empty`].
    pub fn map(&self, tag: impl Into<String>, attrs: Option<Attributes>) -> ElementBuilder {
        ElementBuilder {
            tag: tag.into(),
            attrs,
        }
    }
}

/// A pending element waiting for its children.
#[derive(Debug, Clone)]
#[must_use]
pub struct ElementBuilder {
    tag: String,
    attrs: Option<Attributes>,
}

impl ElementBuilder {
    /// Wrap `children` and produce the node.
    pub fn children(self, children: impl Into<Children>) -> Node {
        Node::element(self.tag, self.attrs, children)
    }

    /// Produce a void element.
    pub fn empty(self) -> Node {
        Node::element(self.tag, self.attrs, Children::Empty)
    }
}

/// Concatenate the visible text of `parts`.
pub fn join(parts: &[Node]) -> String {
    let mut out = String::new();
    for part in parts {
        out.push_str(&part.text_content());
    }
    out
}

/// A syntax extension invoked for `@[name:args]`.
///
/// Closures with the matching signature implement this trait.
pub trait Plugin: Send + Sync {
    /// Handle one call.
    ///
    /// `args` is the raw text after the colon. `content` is the parsed body
    /// for block calls and empty for inline calls.
    fn call(
        &self,
        args: &str,
        content: &[Node],
        mapper: &ElementMapper,
        join: JoinFn,
    ) -> PluginOutput;
}

impl<F> Plugin for F
where
    F: Fn(&str, &[Node], &ElementMapper, JoinFn) -> PluginOutput + Send + Sync,
{
    fn call(
        &self,
        args: &str,
        content: &[Node],
        mapper: &ElementMapper,
        join: JoinFn,
    ) -> PluginOutput {
        self(args, content, mapper, join)
    }
}

/// Immutable name → plugin mapping, built before the parser.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin function under `name`, replacing any previous one.
    pub fn register<F>(self, name: impl Into<String>, plugin: F) -> Self
    where
        F: Fn(&str, &[Node], &ElementMapper, JoinFn) -> PluginOutput + Send + Sync + 'static,
    {
        self.register_plugin(name, plugin)
    }

    /// Register any [`Plugin`] implementation under `name`.
    pub fn register_plugin(mut self, name: impl Into<String>, plugin: impl Plugin + 'static) -> Self {
        self.plugins.insert(name.into(), Arc::new(plugin));
        self
    }

    /// Check whether `name` is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up `name` and invoke it. `None` when the name is unknown.
    pub fn dispatch(&self, name: &str, args: &str, content: &[Node]) -> Option<PluginOutput> {
        let Some(plugin) = self.plugins.get(name) else {
            debug!("unknown plugin '{}', keeping call literal", name);
            return None;
        };
        debug!("dispatching plugin '{}' ({} content nodes)", name, content.len());
        Some(plugin.call(args, content, &ElementMapper::new(), join))
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// A recognized `@[name:args]` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PluginCall<'a> {
    pub name: &'a str,
    pub args: &'a str,
    /// Byte offset just past the closing `]`.
    pub end: usize,
}

#[inline(always)]
fn is_plugin_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Recognize a plugin call starting at `at` (which must hold `@`).
///
/// The call must close on the same line. Square brackets inside `args`
/// nest, so `@[note:see [1]]` carries args `see [1]`.
pub(crate) fn parse_call(s: &str, at: usize) -> Option<PluginCall<'_>> {
    let bytes = s.as_bytes();
    if !s[at..].starts_with("@[") {
        return None;
    }

    let name_start = at + 2;
    let mut i = name_start;
    while i < bytes.len() && is_plugin_name_char(bytes[i]) {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    let name = &s[name_start..i];

    let args_start = match bytes.get(i)? {
        b']' => return Some(PluginCall { name, args: "", end: i + 1 }),
        b':' => i + 1,
        _ => return None,
    };

    let mut depth = 1usize;
    let mut pos = args_start;
    while let Some(offset) = memchr2(b'[', b']', &bytes[pos..]) {
        let hit = pos + offset;
        if bytes[pos..hit].contains(&b'\n') {
            return None;
        }
        if bytes[hit] == b'[' {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return Some(PluginCall {
                    name,
                    args: &s[args_start..hit],
                    end: hit + 1,
                });
            }
        }
        pos = hit + 1;
    }

    None
}
