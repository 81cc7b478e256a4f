//! # Kanamark Core
//!
//! A Markdown-like text format with Japanese ruby annotations, HTML
//! passthrough and a plugin syntax, converted to HTML or to a node tree.
//!
//! ## Quick Start
//!
//! ```rust
//! use kanamark_core::{ParseOptions, Parser};
//!
//! let parser = Parser::new(ParseOptions::default());
//! let html = parser.parse("｜漢字《かんじ》を**読む**").unwrap();
//!
//! assert_eq!(
//!     html.as_html(),
//!     Some("<p><ruby>漢字<rt>かんじ</rt></ruby>を<strong>読む</strong></p>")
//! );
//! ```
//!
//! ## Node tree
//!
//! With [`ExportStrategy::Ast`] the parser returns the top-level blocks as
//! [`Node`]s. Serialized with serde, a node is either a string or
//! `[tag, attributes | null, children]`:
//!
//! ```rust
//! use kanamark_core::{ExportStrategy, ParseOptions, Parser};
//!
//! let parser = Parser::new(ParseOptions::default().with_export(ExportStrategy::Ast));
//! let nodes = parser.parse("# Hi").unwrap().into_ast().unwrap();
//!
//! assert_eq!(nodes[0].tag(), Some("h1"));
//! assert_eq!(nodes[0].text_content(), "Hi");
//! ```
//!
//! ## Errors
//!
//! Malformed markup never fails: unclosed constructs are kept as literal
//! text. The only failures are resource limits (nesting depth and input
//! size), reported as [`ParseError`].

pub mod ast;
pub mod error;
pub mod export;
mod html;
mod inline;
pub mod lexer;
pub mod parser;
pub mod plugin;

pub use ast::{Attributes, Children, Element, Node};
pub use error::{ParseError, ParseErrorKind};
pub use export::{
    render_html, AstExporter, ExportStrategy, Exported, Exporter, HtmlExporter, UnknownStrategy,
};
pub use parser::{parse, ParseOptions, Parser, DEFAULT_MAX_NESTING};
pub use plugin::{join, ElementBuilder, ElementMapper, JoinFn, Plugin, PluginOutput, PluginRegistry};
