//! Integration tests for the kanamark parser

use kanamark_core::{
    join, Attributes, Children, ElementMapper, ExportStrategy, Exported, JoinFn, Node,
    ParseErrorKind, ParseOptions, Parser, PluginOutput, PluginRegistry,
};
use serde_json::json;

fn html(input: &str) -> String {
    Parser::default().parse(input).unwrap().into_html().unwrap()
}

fn html_with(input: &str, plugins: PluginRegistry) -> String {
    Parser::new(ParseOptions::default().with_plugins(plugins))
        .parse(input)
        .unwrap()
        .into_html()
        .unwrap()
}

fn ast(input: &str) -> Vec<Node> {
    Parser::new(ParseOptions::default().with_export(ExportStrategy::Ast))
        .parse(input)
        .unwrap()
        .into_ast()
        .unwrap()
}

fn element(node: &Node) -> &kanamark_core::Element {
    node.as_element()
        .unwrap_or_else(|| panic!("Expected element, got {:?}", node))
}

fn kbd_plugin() -> PluginRegistry {
    PluginRegistry::new().register(
        "kbd",
        |args: &str, _content: &[Node], mapper: &ElementMapper, _join: JoinFn| -> PluginOutput {
            mapper.map("kbd", None).children(args).into()
        },
    )
}

fn note_plugin() -> PluginRegistry {
    PluginRegistry::new().register(
        "note",
        |args: &str, content: &[Node], mapper: &ElementMapper, _join: JoinFn| -> PluginOutput {
            let attrs = Attributes::new().with("class", args);
            mapper.map("aside", Some(attrs)).children(content.to_vec()).into()
        },
    )
}

// ============================================================================
// Ruby Annotation Tests
// ============================================================================

#[test]
fn test_ruby_in_paragraph() {
    assert_eq!(
        html("｜漢字《かんじ》"),
        "<p><ruby>漢字<rt>かんじ</rt></ruby></p>"
    );
}

#[test]
fn test_ruby_ast_shape() {
    let nodes = ast("｜漢字《かんじ》");
    let p = element(&nodes[0]);
    let ruby = element(&p.children.as_slice()[0]);

    assert_eq!(ruby.tag, "ruby");
    assert_eq!(ruby.children.len(), 2);
    assert_eq!(ruby.children.as_slice()[0], Node::text("漢字"));

    let rt = element(&ruby.children.as_slice()[1]);
    assert_eq!(rt.tag, "rt");
    assert_eq!(rt.children, Children::from("かんじ"));
}

#[test]
fn test_ruby_surrounded_by_text() {
    assert_eq!(
        html("今日は｜東京《とうきょう》へ行く"),
        "<p>今日は<ruby>東京<rt>とうきょう</rt></ruby>へ行く</p>"
    );
}

#[test]
fn test_ruby_in_heading() {
    assert_eq!(
        html("# ｜東京《とうきょう》"),
        "<h1><ruby>東京<rt>とうきょう</rt></ruby></h1>"
    );
}

#[test]
fn test_unterminated_ruby_is_literal() {
    assert_eq!(html("｜漢字"), "<p>｜漢字</p>");
    assert_eq!(html("｜漢字《かんじ"), "<p>｜漢字《かんじ</p>");
}

#[test]
fn test_ruby_requires_base_and_reading() {
    assert_eq!(html("｜《かな》"), "<p>｜《かな》</p>");
    assert_eq!(html("｜漢字《》"), "<p>｜漢字《》</p>");
}

#[test]
fn test_reading_brackets_without_bar_are_text() {
    assert_eq!(html("漢字《かんじ》"), "<p>漢字《かんじ》</p>");
}

#[test]
fn test_other_fullwidth_punctuation_is_text() {
    assert_eq!(html("はい！ ＯＫ？"), "<p>はい！ ＯＫ？</p>");
}

// ============================================================================
// Emphasis Tests
// ============================================================================

#[test]
fn test_parse_inline_emphasis() {
    assert_eq!(html("*em* and _em_"), "<p><em>em</em> and <em>em</em></p>");
}

#[test]
fn test_parse_inline_strong() {
    assert_eq!(
        html("**strong** and __strong__"),
        "<p><strong>strong</strong> and <strong>strong</strong></p>"
    );
}

#[test]
fn test_emphasis_nesting() {
    let nodes = ast("**a *b* c**");
    let p = element(&nodes[0]);
    assert_eq!(p.children.len(), 1);

    let strong = element(&p.children.as_slice()[0]);
    assert_eq!(strong.tag, "strong");

    let children = strong.children.as_slice();
    assert_eq!(children.len(), 3);
    assert_eq!(children[0], Node::text("a "));
    assert_eq!(children[1], Node::element("em", None, vec![Node::text("b")]));
    assert_eq!(children[2], Node::text(" c"));
}

#[test]
fn test_triple_delimiter() {
    assert_eq!(
        html("***both***"),
        "<p><strong><em>both</em></strong></p>"
    );
}

#[test]
fn test_unpaired_delimiters_are_literal() {
    assert_eq!(html("**unclosed"), "<p>**unclosed</p>");
    assert_eq!(html("a * b"), "<p>a * b</p>");
    assert_eq!(html("*a\nb*"), "<p>*a\nb*</p>");
}

#[test]
fn test_intraword_underscore() {
    assert_eq!(html("snake_case_name"), "<p>snake_case_name</p>");
}

#[test]
fn test_backslash_escape() {
    assert_eq!(html("\\*not em\\*"), "<p>*not em*</p>");
    assert_eq!(html("a\\b"), "<p>a\\b</p>");
}

#[test]
fn test_escaped_ampersand_is_not_decoded() {
    assert_eq!(html("\\&amp;"), "<p>&amp;amp;</p>");
    assert_eq!(ast("\\&lt;x")[0].text_content(), "&lt;x");
}

#[test]
fn test_unpaired_opener_does_not_hide_later_pairs() {
    assert_eq!(html("*a\n*b*"), "<p>*a\n<em>b</em></p>");
    assert_eq!(html("a *b\nc *d* e"), "<p>a *b\nc <em>d</em> e</p>");
    assert_eq!(html("**a\n**b**"), "<p>**a\n<strong>b</strong></p>");
    assert_eq!(html("_a _b _c"), "<p>_a _b _c</p>");
}

// ============================================================================
// Code Tests
// ============================================================================

#[test]
fn test_parse_inline_code_span() {
    assert_eq!(html("`a*b*`"), "<p><code>a*b*</code></p>");
    assert_eq!(html("``a ` b``"), "<p><code>a ` b</code></p>");
    assert_eq!(html("`x`"), "<p><code>x</code></p>");
}

#[test]
fn test_unmatched_backtick_is_literal() {
    assert_eq!(html("`open"), "<p>`open</p>");
}

#[test]
fn test_unmatched_backtick_run_does_not_hide_later_spans() {
    assert_eq!(html("``a `b`"), "<p>``a <code>b</code></p>");
    assert_eq!(html("`a\n`b`"), "<p>`a\n<code>b</code></p>");
}

#[test]
fn test_parse_code_block() {
    let input = "```rust\nfn main() {\n    println!(\"Hello\");\n}\n```";
    assert_eq!(
        html(input),
        "<pre><code class=\"language-rust\">fn main() {\n    println!(&quot;Hello&quot;);\n}</code></pre>"
    );
}

#[test]
fn test_parse_code_block_no_lang() {
    let nodes = ast("```\nplain code\n```");
    let pre = element(&nodes[0]);
    assert_eq!(pre.tag, "pre");

    let code = element(&pre.children.as_slice()[0]);
    assert_eq!(code.tag, "code");
    assert!(code.attrs.is_none());
    assert_eq!(code.children, Children::from("plain code"));
}

#[test]
fn test_code_block_is_verbatim() {
    assert_eq!(
        html("```\n**not bold** <b>\n```"),
        "<pre><code>**not bold** &lt;b&gt;</code></pre>"
    );
}

#[test]
fn test_parse_unclosed_code_block() {
    assert_eq!(
        html("```\nfn main() {}\n\nmore"),
        "<pre><code>fn main() {}\n\nmore</code></pre>"
    );
}

#[test]
fn test_longer_closing_fence() {
    assert_eq!(html("```\na\n`````\nafter"), "<pre><code>a</code></pre><p>after</p>");
}

// ============================================================================
// Heading Tests
// ============================================================================

#[test]
fn test_parse_heading_levels() {
    let input = "# H1\n## H2\n### H3\n#### H4\n##### H5\n###### H6";
    let nodes = ast(input);

    assert_eq!(nodes.len(), 6);
    for (i, node) in nodes.iter().enumerate() {
        assert_eq!(node.tag(), Some(format!("h{}", i + 1).as_str()));
    }
}

#[test]
fn test_parse_heading_content() {
    assert_eq!(html("# Hello **World**"), "<h1>Hello <strong>World</strong></h1>");
}

#[test]
fn test_closing_hashes_stripped() {
    assert_eq!(html("## Title ##"), "<h2>Title</h2>");
    assert_eq!(html("## C#"), "<h2>C#</h2>");
}

#[test]
fn test_invalid_heading_no_space() {
    assert_eq!(html("#NoSpace"), "<p>#NoSpace</p>");
}

#[test]
fn test_heading_level_too_high() {
    assert_eq!(html("####### Seven hashes"), "<p>####### Seven hashes</p>");
}

#[test]
fn test_setext_headings() {
    assert_eq!(html("Title\n====="), "<h1>Title</h1>");
    assert_eq!(html("Sub\n---"), "<h2>Sub</h2>");
    assert_eq!(html("a\nb\n==="), "<h1>a\nb</h1>");
}

#[test]
fn test_setext_underline_needs_a_paragraph() {
    assert_eq!(html("---\n---"), "<hr /><hr />");
    assert_eq!(html("***\n---"), "<hr /><hr />");
    assert_eq!(html("> q\n---"), "<blockquote><p>q</p></blockquote><hr />");
    assert_eq!(html("- a\n---"), "<ul><li>a</li></ul><hr />");
    assert_eq!(html("- item\n==="), "<ul><li>item\n===</li></ul>");
    assert_eq!(html("# Title\n==="), "<h1>Title</h1><p>===</p>");
}

// ============================================================================
// Paragraph Tests
// ============================================================================

#[test]
fn test_parse_simple_paragraph() {
    let nodes = ast("Hello, world!");
    assert_eq!(nodes.len(), 1);
    assert_eq!(
        nodes[0],
        Node::element("p", None, vec![Node::text("Hello, world!")])
    );
}

#[test]
fn test_parse_multiline_paragraph() {
    assert_eq!(html("Line one\nLine two"), "<p>Line one\nLine two</p>");
}

#[test]
fn test_parse_multiple_paragraphs() {
    assert_eq!(ast("First paragraph.\n\nSecond paragraph.").len(), 2);
}

#[test]
fn test_paragraph_interrupted_by_blocks() {
    assert_eq!(html("intro\n- a"), "<p>intro</p><ul><li>a</li></ul>");
    assert_eq!(html("intro\n# h"), "<p>intro</p><h1>h</h1>");
    assert_eq!(html("intro\n> q"), "<p>intro</p><blockquote><p>q</p></blockquote>");
}

#[test]
fn test_parse_empty_input() {
    assert_eq!(html(""), "");
    assert!(ast("").is_empty());
}

#[test]
fn test_parse_whitespace_only() {
    assert!(ast("   \n\n\t\n").is_empty());
}

#[test]
fn test_blank_lines_are_insignificant() {
    assert_eq!(html("\n\n\na\n\n\n\nb\n\n"), "<p>a</p><p>b</p>");
}

#[test]
fn test_crlf_line_endings() {
    assert_eq!(html("a\r\nb\r\n\r\nc"), "<p>a\nb</p><p>c</p>");
}

#[test]
fn test_text_is_escaped() {
    assert_eq!(html("a & b < c"), "<p>a &amp; b &lt; c</p>");
}

#[test]
fn test_entities_are_decoded_in_text() {
    let nodes = ast("AT&amp;T");
    assert_eq!(nodes[0].text_content(), "AT&T");
    assert_eq!(html("AT&amp;T"), "<p>AT&amp;T</p>");
}

// ============================================================================
// Thematic Break and Blockquote Tests
// ============================================================================

#[test]
fn test_parse_thematic_break() {
    assert_eq!(html("a\n\n---\n\nb"), "<p>a</p><hr /><p>b</p>");
    assert_eq!(html("***"), "<hr />");
    assert_eq!(html("_ _ _"), "<hr />");
}

#[test]
fn test_parse_quote() {
    assert_eq!(
        html("> To be\n> or not"),
        "<blockquote><p>To be\nor not</p></blockquote>"
    );
}

#[test]
fn test_nested_quote() {
    assert_eq!(
        html("> a\n> > b"),
        "<blockquote><p>a</p><blockquote><p>b</p></blockquote></blockquote>"
    );
}

#[test]
fn test_quote_contains_blocks() {
    assert_eq!(
        html("> # Title\n> - item"),
        "<blockquote><h1>Title</h1><ul><li>item</li></ul></blockquote>"
    );
}

// ============================================================================
// List Tests
// ============================================================================

#[test]
fn test_parse_unordered_list() {
    assert_eq!(
        html("- Item one\n- Item two\n* Item three"),
        "<ul><li>Item one</li><li>Item two</li><li>Item three</li></ul>"
    );
}

#[test]
fn test_parse_ordered_list() {
    assert_eq!(html("1. First\n2. Second"), "<ol><li>First</li><li>Second</li></ol>");
}

#[test]
fn test_parse_ordered_list_with_start() {
    assert_eq!(html("5. Fifth\n6. Sixth"), "<ol start=\"5\"><li>Fifth</li><li>Sixth</li></ol>");
}

#[test]
fn test_marker_change_starts_new_list() {
    assert_eq!(html("- a\n1. b"), "<ul><li>a</li></ul><ol><li>b</li></ol>");
    assert_eq!(html("1. a\n- b"), "<ol><li>a</li></ol><ul><li>b</li></ul>");
}

#[test]
fn test_marker_change_with_one_space_indent_starts_new_list() {
    assert_eq!(html("- a\n 1. b"), "<ul><li>a</li></ul><ol><li>b</li></ol>");
}

#[test]
fn test_nested_list() {
    assert_eq!(
        html("- a\n  - b\n  - c\n- d"),
        "<ul><li>a<ul><li>b</li><li>c</li></ul></li><li>d</li></ul>"
    );
}

#[test]
fn test_nested_list_of_other_kind() {
    assert_eq!(
        html("- a\n  1. b"),
        "<ul><li>a<ol><li>b</li></ol></li></ul>"
    );
}

#[test]
fn test_deeply_nested_list() {
    assert_eq!(
        html("- a\n  - b\n    - c"),
        "<ul><li>a<ul><li>b<ul><li>c</li></ul></li></ul></li></ul>"
    );
}

#[test]
fn test_list_continuation_text() {
    assert_eq!(html("- a\ncontinued"), "<ul><li>a\ncontinued</li></ul>");
    assert_eq!(html("- a\n  indented"), "<ul><li>a\nindented</li></ul>");
}

#[test]
fn test_blank_line_ends_list() {
    assert_eq!(html("- a\n\n- b"), "<ul><li>a</li></ul><ul><li>b</li></ul>");
}

#[test]
fn test_list_ends_at_block() {
    assert_eq!(html("- a\n# h"), "<ul><li>a</li></ul><h1>h</h1>");
}

#[test]
fn test_list_item_inlines() {
    assert_eq!(
        html("- **bold** and ｜字《じ》"),
        "<ul><li><strong>bold</strong> and <ruby>字<rt>じ</rt></ruby></li></ul>"
    );
}

// ============================================================================
// Table Tests
// ============================================================================

#[test]
fn test_parse_table() {
    let input = "| a | b |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |";
    assert_eq!(
        html(input),
        "<table><thead><tr><th>a</th><th>b</th></tr></thead>\
         <tbody><tr><td>1</td><td>2</td></tr><tr><td>3</td><td>4</td></tr></tbody></table>"
    );
}

#[test]
fn test_table_row_count_and_column_order() {
    let input = "| x | y | z |\n| - | - | - |\n| 1 | 2 | 3 |\n| 4 | 5 | 6 |\n| 7 | 8 | 9 |";
    let nodes = ast(input);
    let table = element(&nodes[0]);
    let sections = table.children.as_slice();
    assert_eq!(sections.len(), 2);

    let thead = element(&sections[0]);
    assert_eq!(thead.children.len(), 1);

    let tbody = element(&sections[1]);
    assert_eq!(tbody.children.len(), 3);

    let first_row = element(&tbody.children.as_slice()[0]);
    let cells: Vec<String> = first_row
        .children
        .as_slice()
        .iter()
        .map(Node::text_content)
        .collect();
    assert_eq!(cells, vec!["1", "2", "3"]);
}

#[test]
fn test_table_without_rows() {
    assert_eq!(
        html("| a |\n|---|"),
        "<table><thead><tr><th>a</th></tr></thead></table>"
    );
}

#[test]
fn test_table_alignment() {
    let input = "| a | b | c |\n|:--|:-:|--:|\n| 1 | 2 | 3 |";
    let out = html(input);
    assert!(out.contains("<th style=\"text-align: left\">a</th>"));
    assert!(out.contains("<th style=\"text-align: center\">b</th>"));
    assert!(out.contains("<td style=\"text-align: right\">3</td>"));
}

#[test]
fn test_table_rows_padded_and_truncated() {
    let input = "| a | b |\n|---|---|\n| 1 |\n| 2 | 3 | 4 |";
    assert!(html(input).contains(
        "<tbody><tr><td>1</td><td></td></tr><tr><td>2</td><td>3</td></tr></tbody>"
    ));
}

#[test]
fn test_table_separator_column_mismatch() {
    assert_eq!(html("| a | b |\n|---|"), "<p>| a | b |\n|---|</p>");
}

#[test]
fn test_table_escaped_pipe() {
    assert_eq!(
        html("| a \\| b |\n|---|"),
        "<table><thead><tr><th>a | b</th></tr></thead></table>"
    );
}

// ============================================================================
// Link and Image Tests
// ============================================================================

#[test]
fn test_parse_inline_link() {
    assert_eq!(html("[home](/)"), "<p><a href=\"/\">home</a></p>");
}

#[test]
fn test_link_title() {
    assert_eq!(
        html("[home](/ \"Home page\")"),
        "<p><a href=\"/\" title=\"Home page\">home</a></p>"
    );
}

#[test]
fn test_link_text_is_scanned() {
    assert_eq!(
        html("[**b** ｜字《じ》](u)"),
        "<p><a href=\"u\"><strong>b</strong> <ruby>字<rt>じ</rt></ruby></a></p>"
    );
}

#[test]
fn test_parse_image() {
    assert_eq!(
        html("![alt text](a.png)"),
        "<p><img src=\"a.png\" alt=\"alt text\" /></p>"
    );

    let nodes = ast("![a](b.png)");
    let img = element(&element(&nodes[0]).children.as_slice()[0]);
    assert_eq!(img.tag, "img");
    assert!(img.children.is_void());
    assert_eq!(img.attr("src"), Some("b.png"));
    assert_eq!(img.attr("alt"), Some("a"));
}

#[test]
fn test_unmatched_link_is_literal() {
    assert_eq!(html("[x](y"), "<p>[x](y</p>");
    assert_eq!(html("[x] (y)"), "<p>[x] (y)</p>");
}

#[test]
fn test_link_parts_are_entity_decoded() {
    assert_eq!(
        html("[x](?a=1&amp;b=2)"),
        "<p><a href=\"?a=1&amp;b=2\">x</a></p>"
    );
    assert_eq!(
        html("![&lt;a&gt;](p.png \"&quot;t&quot;\")"),
        "<p><img src=\"p.png\" alt=\"&lt;a&gt;\" title=\"&quot;t&quot;\" /></p>"
    );

    let nodes = ast("[x](?a=1&amp;b=2)");
    let link = element(&element(&nodes[0]).children.as_slice()[0]);
    assert_eq!(link.attr("href"), Some("?a=1&b=2"));
}

#[test]
fn test_unmatched_bracket_before_link() {
    assert_eq!(html("[a [b](c)"), "<p>[a <a href=\"c\">b</a></p>");
    assert_eq!(html("[a](b [c](d)"), "<p>[a](b <a href=\"d\">c</a></p>");
    assert_eq!(html("[a\\](b)"), "<p>[a](b)</p>");
}

// ============================================================================
// HTML Passthrough Tests
// ============================================================================

#[test]
fn test_inline_html_passthrough() {
    assert_eq!(html("<cite>X</cite>"), "<p><cite>X</cite></p>");
}

#[test]
fn test_html_passthrough_reparse() {
    let first = html("<cite>X</cite>");
    let second = html(&first);
    assert_eq!(second, first);
    assert_eq!(ast(&first), ast("<cite>X</cite>"));
}

#[test]
fn test_markdown_inside_inline_html() {
    assert_eq!(
        html("<span class=\"x\">a *b*</span>"),
        "<p><span class=\"x\">a <em>b</em></span></p>"
    );
}

#[test]
fn test_nested_same_name_tags() {
    assert_eq!(
        html("<span>a <span>b</span> c</span>"),
        "<p><span>a <span>b</span> c</span></p>"
    );
}

#[test]
fn test_inline_void_tag() {
    assert_eq!(html("a<br>b"), "<p>a<br />b</p>");
}

#[test]
fn test_unclosed_tag_is_literal() {
    assert_eq!(html("<span>oops"), "<p>&lt;span&gt;oops</p>");
    assert_eq!(html("a < b"), "<p>a &lt; b</p>");
}

#[test]
fn test_unclosed_tag_before_matched_pair() {
    assert_eq!(html("<b><b></b>"), "<p>&lt;b&gt;<b></b></p>");
    assert_eq!(
        html("<div>\n<div>x</div>"),
        "<p>&lt;div&gt;</p><div>x</div>"
    );
}

#[test]
fn test_html_attribute_entities_are_not_escaped_twice() {
    assert_eq!(
        html("<a href=\"?a=1&amp;b=2\">x</a>"),
        "<p><a href=\"?a=1&amp;b=2\">x</a></p>"
    );

    let first = html("<span title=\"&lt;b&gt;\">x</span>");
    assert_eq!(first, "<p><span title=\"&lt;b&gt;\">x</span></p>");
    assert_eq!(html(&first), first);
}

#[test]
fn test_html_block_with_blocks_inside() {
    assert_eq!(html("<div>\n# Title\n</div>"), "<div><h1>Title</h1></div>");
}

#[test]
fn test_html_block_single_line() {
    assert_eq!(
        html("<div class=\"note\">hi *there*</div>"),
        "<div class=\"note\">hi <em>there</em></div>"
    );
}

#[test]
fn test_html_block_void() {
    assert_eq!(html("<hr>\ntext"), "<hr /><p>text</p>");
}

#[test]
fn test_html_block_requires_close_at_line_end() {
    assert_eq!(html("<div>a</div> tail"), "<p><div>a</div> tail</p>");
}

#[test]
fn test_raw_text_element_is_verbatim() {
    let nodes = ast("<script>if (a < b && *c*) {}</script>");
    let script = element(&nodes[0]);
    assert_eq!(script.tag, "script");
    assert_eq!(script.children.as_slice(), &[Node::text("if (a < b && *c*) {}")]);
}

// ============================================================================
// Plugin Tests
// ============================================================================

#[test]
fn test_unknown_plugin_is_literal() {
    assert_eq!(html("@[nope:x]"), "<p>@[nope:x]</p>");
    assert_eq!(html("see @[nope] here"), "<p>see @[nope] here</p>");
}

#[test]
fn test_inline_plugin() {
    assert_eq!(
        html_with("Press @[kbd:Ctrl] now", kbd_plugin()),
        "<p>Press <kbd>Ctrl</kbd> now</p>"
    );
}

#[test]
fn test_plugin_args_are_raw() {
    let plugins = PluginRegistry::new().register(
        "echo",
        |args: &str, _content: &[Node], _mapper: &ElementMapper, _join: JoinFn| -> PluginOutput {
            args.into()
        },
    );
    assert_eq!(
        html_with("x @[echo:*not* [parsed]]", plugins),
        "<p>x *not* [parsed]</p>"
    );
}

#[test]
fn test_plugin_text_output_is_escaped() {
    let plugins = PluginRegistry::new().register(
        "raw",
        |_args: &str, _content: &[Node], _mapper: &ElementMapper, _join: JoinFn| -> PluginOutput {
            PluginOutput::Text("<b>".to_string())
        },
    );
    assert_eq!(html_with("x @[raw]", plugins), "<p>x &lt;b&gt;</p>");
}

#[test]
fn test_plugin_block_with_body() {
    let input = "@[note:warn]\n  First *para*\n\n  Second\nAfter";
    assert_eq!(
        html_with(input, note_plugin()),
        "<aside class=\"warn\"><p>First <em>para</em></p><p>Second</p></aside><p>After</p>"
    );
}

#[test]
fn test_plugin_block_without_body() {
    assert_eq!(
        html_with("@[note:empty]\n\ntext", note_plugin()),
        "<aside class=\"empty\"></aside><p>text</p>"
    );
}

#[test]
fn test_nested_plugin_blocks() {
    let input = "@[note:outer]\n  @[note:inner]\n    deep";
    assert_eq!(
        html_with(input, note_plugin()),
        "<aside class=\"outer\"><aside class=\"inner\"><p>deep</p></aside></aside>"
    );
}

#[test]
fn test_unregistered_block_plugin_falls_through() {
    assert_eq!(html("@[nope]\n  body"), "<p>@[nope]\nbody</p>");
}

#[test]
fn test_plugin_join() {
    let plugins = PluginRegistry::new().register(
        "upper",
        |_args: &str, content: &[Node], _mapper: &ElementMapper, join: JoinFn| -> PluginOutput {
            join(content).to_uppercase().into()
        },
    );
    assert_eq!(html_with("@[upper]\n  a *b*", plugins), "A B");
}

#[test]
fn test_join_concatenates_visible_text() {
    let nodes = vec![
        Node::text("a "),
        Node::element("em", None, vec![Node::text("b")]),
        Node::element("img", None, Children::Empty),
        Node::text(" c"),
    ];
    assert_eq!(join(&nodes), "a b c");
}

#[test]
fn test_registry_lookup() {
    let plugins = kbd_plugin();
    assert!(plugins.contains("kbd"));
    assert!(!plugins.contains("note"));
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins.names(), vec!["kbd"]);
    assert!(plugins.dispatch("missing", "", &[]).is_none());
}

// ============================================================================
// Resource Limit Tests
// ============================================================================

#[test]
fn test_deep_blockquote_exceeds_nesting() {
    let input = format!("{} deep", ">".repeat(100));
    let err = Parser::default().parse(&input).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::NestingTooDeep);
    assert!(err.is_nesting());
}

#[test]
fn test_deep_inline_html_exceeds_nesting() {
    let input = format!("{}x{}", "<span>".repeat(100), "</span>".repeat(100));
    let err = Parser::default().parse(&input).unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::NestingTooDeep);
}

#[test]
fn test_raised_nesting_limit() {
    let input = format!("{} deep", ">".repeat(100));
    let parser = Parser::new(ParseOptions::default().with_max_nesting(200));
    let out = parser.parse(&input).unwrap().into_html().unwrap();
    assert!(out.starts_with("<blockquote><blockquote>"));
    assert!(out.contains("<p>deep</p>"));
}

#[test]
fn test_input_size_limit() {
    let parser = Parser::new(ParseOptions::default().with_max_input_bytes(4));
    let err = parser.parse("hello").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::InputTooLarge);
    assert!(parser.parse("hi").is_ok());
}

// ============================================================================
// Export Tests
// ============================================================================

#[test]
fn test_ast_json_shape() {
    let nodes = ast("# Hi *x*\n\n![a](b.png) `c`");
    let value = serde_json::to_value(&nodes).unwrap();
    assert_eq!(
        value,
        json!([
            ["h1", null, ["Hi ", ["em", null, ["x"]]]],
            ["p", null, [
                ["img", {"src": "b.png", "alt": "a"}, null],
                " ",
                ["code", null, "c"]
            ]]
        ])
    );
}

#[test]
fn test_exported_serializes_to_value() {
    let out = Parser::default().parse("hi").unwrap();
    assert_eq!(serde_json::to_value(&out).unwrap(), json!("<p>hi</p>"));
}

#[test]
fn test_export_strategy_from_str() {
    assert_eq!("html".parse::<ExportStrategy>().unwrap(), ExportStrategy::Html);
    assert_eq!("AST".parse::<ExportStrategy>().unwrap(), ExportStrategy::Ast);
    assert!("xml".parse::<ExportStrategy>().is_err());
}

#[test]
fn test_ast_preserves_order() {
    let nodes = ast("# one\n\ntwo\n\n- three\n\n> four");
    let tags: Vec<&str> = nodes.iter().filter_map(Node::tag).collect();
    assert_eq!(tags, vec!["h1", "p", "ul", "blockquote"]);

    let texts: Vec<String> = nodes.iter().map(Node::text_content).collect();
    assert_eq!(texts, vec!["one", "two", "three", "four"]);
}

#[test]
fn test_exported_accessors() {
    let html_out = Exported::Html("<p>x</p>".to_string());
    assert_eq!(html_out.as_html(), Some("<p>x</p>"));
    assert!(html_out.as_ast().is_none());

    let ast_out = Exported::Ast(vec![Node::text("x")]);
    assert!(ast_out.as_html().is_none());
    assert_eq!(ast_out.into_ast(), Some(vec![Node::text("x")]));
}

#[test]
fn test_render_hand_built_tree() {
    let tree = vec![Node::element(
        "p",
        Some(Attributes::new().with("title", "a\"b")),
        vec![
            Node::text("1 < 2"),
            Node::element("span", None, Vec::new()),
            Node::element("wbr", None, Children::Empty),
        ],
    )];
    assert_eq!(
        kanamark_core::render_html(&tree),
        "<p title=\"a&quot;b\">1 &lt; 2<span></span><wbr /></p>"
    );
}

#[test]
fn test_parser_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Parser>();
}

// ============================================================================
// Complex Document Tests
// ============================================================================

#[test]
fn test_parse_complex_document() {
    let input = r#"# ｜日本語《にほんご》の文書

This is a **paragraph** with `code` and a [link](https://example.com).

- Item one
- Item two
  1. Nested

| col | val |
|-----|----:|
| a   | 1   |

> Quote with *emphasis*

```text
raw <text>
```
"#;

    let nodes = ast(input);
    let tags: Vec<&str> = nodes.iter().filter_map(Node::tag).collect();
    assert_eq!(tags, vec!["h1", "p", "ul", "table", "blockquote", "pre"]);

    let out = html(input);
    assert!(out.starts_with("<h1><ruby>日本語<rt>にほんご</rt></ruby>の文書</h1>"));
    assert!(out.contains("<a href=\"https://example.com\">link</a>"));
    assert!(out.contains("<li>Item two<ol><li>Nested</li></ol></li>"));
    assert!(out.contains("<td style=\"text-align: right\">1</td>"));
    assert!(out.ends_with("<pre><code class=\"language-text\">raw &lt;text&gt;</code></pre>"));
}
