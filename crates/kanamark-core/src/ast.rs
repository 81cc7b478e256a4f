//! Node tree produced by the parser.
//!
//! The tree has exactly two kinds of node:
//!
//! - **Text leaves**: immutable strings.
//! - **Elements**: a tag name, optional attributes and children.
//!
//! Children keep the single-vs-many distinction of the source construct:
//! an image has no children, a code span has exactly one, a paragraph has a
//! sequence. Order is significant and preserved end-to-end.
//!
//! With serde, a node serializes to the tuple shape
//! `string | [tag, {attrs} | null, children]` where `children` is a single
//! node, an array of nodes, or `null` when absent.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// A single node in the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Plain text leaf (not escaped).
    Text(String),
    /// Tagged element with attributes and children.
    Element(Element),
}

impl Node {
    /// Create a text leaf.
    #[inline]
    pub fn text(content: impl Into<String>) -> Self {
        Node::Text(content.into())
    }

    /// Create an element node.
    ///
    /// Empty attribute sets are normalized to `None`.
    #[inline]
    pub fn element(
        tag: impl Into<String>,
        attrs: Option<Attributes>,
        children: impl Into<Children>,
    ) -> Self {
        Node::Element(Element::new(tag, attrs, children))
    }

    /// Borrow the element, if this is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    /// Borrow the text, if this is a leaf.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    /// Tag name for elements, `None` for text.
    pub fn tag(&self) -> Option<&str> {
        self.as_element().map(|e| e.tag.as_str())
    }

    /// Concatenated visible text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                for child in e.children.as_slice() {
                    child.collect_text(out);
                }
            }
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(s)
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Node::Element(e)
    }
}

/// A tagged element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name, never empty.
    pub tag: String,
    /// Attributes; `None` rather than an empty set.
    pub attrs: Option<Attributes>,
    /// Child nodes.
    pub children: Children,
}

impl Element {
    /// Create an element, normalizing empty attributes to `None`.
    pub fn new(
        tag: impl Into<String>,
        attrs: Option<Attributes>,
        children: impl Into<Children>,
    ) -> Self {
        let tag = tag.into();
        debug_assert!(!tag.is_empty(), "element tag must not be empty");
        Self {
            tag,
            attrs: attrs.filter(|a| !a.is_empty()),
            children: children.into(),
        }
    }

    /// Look up an attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.as_ref().and_then(|a| a.get(key))
    }
}

/// Children of an element.
///
/// `Empty` is distinct from `Many(vec![])`: the former marks a void element
/// (`<img />`), the latter a paired element with nothing inside (`<span></span>`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Children {
    /// No children at all (void element).
    #[default]
    Empty,
    /// Exactly one logical child.
    Single(Box<Node>),
    /// An ordered sequence of children.
    Many(Vec<Node>),
}

impl Children {
    /// View the children as a slice regardless of shape.
    pub fn as_slice(&self) -> &[Node] {
        match self {
            Children::Empty => &[],
            Children::Single(node) => std::slice::from_ref(node.as_ref()),
            Children::Many(nodes) => nodes,
        }
    }

    /// Number of child nodes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True when there are no child nodes.
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// True for the void shape.
    pub fn is_void(&self) -> bool {
        matches!(self, Children::Empty)
    }

    /// Consume into an owned vector.
    pub fn into_vec(self) -> Vec<Node> {
        match self {
            Children::Empty => Vec::new(),
            Children::Single(node) => vec![*node],
            Children::Many(nodes) => nodes,
        }
    }
}

impl From<Node> for Children {
    fn from(node: Node) -> Self {
        Children::Single(Box::new(node))
    }
}

impl From<Vec<Node>> for Children {
    fn from(nodes: Vec<Node>) -> Self {
        Children::Many(nodes)
    }
}

impl From<&str> for Children {
    fn from(s: &str) -> Self {
        Children::Single(Box::new(Node::text(s)))
    }
}

impl From<String> for Children {
    fn from(s: String) -> Self {
        Children::Single(Box::new(Node::Text(s)))
    }
}

/// Ordered attribute map with unique keys.
///
/// Entries keep insertion order so HTML output is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    /// Create an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `None` when empty, for direct use as element attributes.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

// ============================================================================
// Tuple-shape serialization
// ============================================================================

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Text(t) => serializer.serialize_str(t),
            Node::Element(e) => e.serialize(serializer),
        }
    }
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.tag)?;
        seq.serialize_element(&self.attrs)?;
        seq.serialize_element(&self.children)?;
        seq.end()
    }
}

impl Serialize for Children {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Children::Empty => serializer.serialize_none(),
            Children::Single(node) => node.serialize(serializer),
            Children::Many(nodes) => nodes.serialize(serializer),
        }
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
