//! Export strategies: the final step from node tree to caller-visible value.
//!
//! The set of strategies is closed ([`ExportStrategy`]) and chosen when the
//! parser is built. Each strategy is backed by an [`Exporter`]
//! implementation, which is also usable on its own for trees built by hand.

use std::fmt;
use std::str::FromStr;

use html_escape::encode_quoted_attribute_to_string;
use serde::ser::{Serialize, Serializer};
use thiserror::Error;

use crate::ast::{Children, Node};

/// Converts a finished node sequence into an output representation.
///
/// Implementations are total: they accept every tree the parser can build.
pub trait Exporter {
    /// The produced representation.
    type Output;

    /// Convert top-level block nodes.
    fn export(&self, nodes: Vec<Node>) -> Self::Output;
}

/// Serializes nodes to an HTML string.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExporter;

impl Exporter for HtmlExporter {
    type Output = String;

    fn export(&self, nodes: Vec<Node>) -> String {
        render_html(&nodes)
    }
}

/// Returns nodes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AstExporter;

impl Exporter for AstExporter {
    type Output = Vec<Node>;

    fn export(&self, nodes: Vec<Node>) -> Vec<Node> {
        nodes
    }
}

/// Render nodes to HTML.
///
/// Text and attribute values are escaped; elements without children render
/// as `<tag />`. Top-level nodes are concatenated with nothing in between.
pub fn render_html(nodes: &[Node]) -> String {
    let mut out = String::with_capacity(nodes.len() * 64);
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => {
            encode_quoted_attribute_to_string(text, out);
        }
        Node::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            if let Some(attrs) = &element.attrs {
                for (key, value) in attrs.iter() {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    encode_quoted_attribute_to_string(value, out);
                    out.push('"');
                }
            }

            match &element.children {
                Children::Empty => out.push_str(" />"),
                children => {
                    out.push('>');
                    for child in children.as_slice() {
                        write_node(out, child);
                    }
                    out.push_str("</");
                    out.push_str(&element.tag);
                    out.push('>');
                }
            }
        }
    }
}

/// Which representation [`Parser::parse`](crate::Parser::parse) returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportStrategy {
    /// HTML string.
    #[default]
    Html,
    /// The node tree itself.
    Ast,
}

impl ExportStrategy {
    /// Apply this strategy to a node sequence.
    pub fn export(self, nodes: Vec<Node>) -> Exported {
        match self {
            ExportStrategy::Html => Exported::Html(HtmlExporter.export(nodes)),
            ExportStrategy::Ast => Exported::Ast(AstExporter.export(nodes)),
        }
    }

    /// Lowercase name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStrategy::Html => "html",
            ExportStrategy::Ast => "ast",
        }
    }
}

impl fmt::Display for ExportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an export strategy name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown export strategy '{0}' (expected 'html' or 'ast')")]
pub struct UnknownStrategy(pub String);

impl FromStr for ExportStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(ExportStrategy::Html),
            "ast" => Ok(ExportStrategy::Ast),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// The value produced by a parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exported {
    /// Rendered HTML.
    Html(String),
    /// Top-level block nodes.
    Ast(Vec<Node>),
}

impl Exported {
    pub fn as_html(&self) -> Option<&str> {
        match self {
            Exported::Html(html) => Some(html),
            Exported::Ast(_) => None,
        }
    }

    pub fn into_html(self) -> Option<String> {
        match self {
            Exported::Html(html) => Some(html),
            Exported::Ast(_) => None,
        }
    }

    pub fn as_ast(&self) -> Option<&[Node]> {
        match self {
            Exported::Ast(nodes) => Some(nodes),
            Exported::Html(_) => None,
        }
    }

    pub fn into_ast(self) -> Option<Vec<Node>> {
        match self {
            Exported::Ast(nodes) => Some(nodes),
            Exported::Html(_) => None,
        }
    }
}

impl Serialize for Exported {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Exported::Html(html) => serializer.serialize_str(html),
            Exported::Ast(nodes) => nodes.serialize(serializer),
        }
    }
}
