//! kmark - render kanamark documents to HTML or AST JSON
//!
//! Usage:
//!   kmark [OPTIONS] [COMMAND] [FILE]
//!
//! Commands:
//!   render    Print the document as HTML (default)
//!   ast       Print the node tree as JSON
//!   stats     Show document statistics

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser as ClapParser, Subcommand};
use kanamark_core::{ExportStrategy, Node, ParseOptions, Parser, DEFAULT_MAX_NESTING};
use log::{debug, info, LevelFilter};
use serde::Serialize;

/// Render kanamark (Markdown with ruby annotations) to HTML or a node tree.
#[derive(ClapParser, Debug)]
#[command(
    name = "kmark",
    version,
    about = "Render kanamark documents to HTML or AST JSON",
    after_help = "Examples:\n  \
                  kmark document.km\n  \
                  cat document.km | kmark ast --pretty\n  \
                  kmark --max-nesting 16 stats document.km"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Input file (reads from stdin if not provided or `-`)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Maximum nesting depth before the parse is rejected
    #[arg(long = "max-nesting", default_value_t = DEFAULT_MAX_NESTING, global = true)]
    max_nesting: usize,

    /// Reject inputs larger than this many bytes
    #[arg(long = "max-bytes", value_name = "BYTES", global = true)]
    max_bytes: Option<usize>,

    /// Set the logging level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Print the document as HTML (default)
    Render {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print the node tree as JSON
    Ast {
        /// Indent the JSON output
        #[arg(short, long)]
        pretty: bool,

        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Show document statistics
    Stats {
        /// Output in JSON format
        #[arg(short, long)]
        json: bool,

        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

impl Command {
    fn file(&self) -> Option<&PathBuf> {
        match self {
            Command::Render { file } | Command::Ast { file, .. } | Command::Stats { file, .. } => {
                file.as_ref()
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match run(&cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn setup_logging(level: &str) {
    let filter = match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Warn,
    };

    env_logger::Builder::new()
        .filter_level(filter)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn run(cli: &Cli) -> Result<(), String> {
    let command = cli
        .command
        .clone()
        .unwrap_or(Command::Render { file: None });
    let input = read_input(command.file().or(cli.file.as_ref()))?;
    info!("read {} bytes", input.len());

    let export = match command {
        Command::Render { .. } => ExportStrategy::Html,
        Command::Ast { .. } | Command::Stats { .. } => ExportStrategy::Ast,
    };
    let parser = Parser::new(build_options(cli, export));
    debug!("parsing with {:?}", parser.options());

    match command {
        Command::Render { .. } => cmd_render(&parser, &input),
        Command::Ast { pretty, .. } => cmd_ast(&parser, &input, pretty),
        Command::Stats { json, .. } => cmd_stats(&parser, &input, json),
    }
}

fn build_options(cli: &Cli, export: ExportStrategy) -> ParseOptions {
    let options = ParseOptions::default()
        .with_export(export)
        .with_max_nesting(cli.max_nesting);
    match cli.max_bytes {
        Some(limit) => options.with_max_input_bytes(limit),
        None => options,
    }
}

fn read_input(file: Option<&PathBuf>) -> Result<String, String> {
    match file {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path)
            .map_err(|e| format!("failed to read '{}': {}", path.display(), e)),
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| format!("failed to read stdin: {}", e))?;
            Ok(input)
        }
    }
}

// =============================================================================
// Render Command
// =============================================================================

fn cmd_render(parser: &Parser, input: &str) -> Result<(), String> {
    let html = parser
        .parse(input)
        .map_err(|e| e.to_string())?
        .into_html()
        .ok_or_else(|| "parser did not produce HTML".to_string())?;
    println!("{}", html);
    Ok(())
}

// =============================================================================
// AST Command
// =============================================================================

/// Parse through the parser's own export; `ast` and `stats` need the tree.
fn parse_ast(parser: &Parser, input: &str) -> Result<Vec<Node>, String> {
    parser
        .parse(input)
        .map_err(|e| e.to_string())?
        .into_ast()
        .ok_or_else(|| "parser did not produce an AST".to_string())
}

fn cmd_ast(parser: &Parser, input: &str, pretty: bool) -> Result<(), String> {
    let nodes = parse_ast(parser, input)?;
    let json = if pretty {
        serde_json::to_string_pretty(&nodes)
    } else {
        serde_json::to_string(&nodes)
    }
    .map_err(|e| format!("failed to serialize AST: {}", e))?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Stats Command
// =============================================================================

fn cmd_stats(parser: &Parser, input: &str, json: bool) -> Result<(), String> {
    let nodes = parse_ast(parser, input)?;
    let stats = DocumentStats::from_nodes(&nodes, input);

    if json {
        let out = serde_json::to_string(&stats)
            .map_err(|e| format!("failed to serialize stats: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!("Document Statistics");
    println!("-------------------");
    println!("Blocks:         {}", stats.blocks);
    println!("Elements:       {}", stats.elements);
    println!("Ruby:           {}", stats.ruby);
    println!("Max depth:      {}", stats.max_depth);
    println!();
    println!("Tags:");
    for (tag, count) in &stats.tags {
        println!("  {:<14}{}", format!("{}:", tag), count);
    }
    println!();
    println!("Size:");
    println!("  Characters:     {}", stats.chars);
    println!("  Words (est.):   {}", stats.words);
    println!("  Lines:          {}", stats.lines);

    Ok(())
}

#[derive(Debug, Default, Serialize)]
struct DocumentStats {
    blocks: usize,
    elements: usize,
    ruby: usize,
    max_depth: usize,
    tags: BTreeMap<String, usize>,
    chars: usize,
    words: usize,
    lines: usize,
}

impl DocumentStats {
    fn from_nodes(nodes: &[Node], input: &str) -> Self {
        let mut stats = Self {
            blocks: nodes.len(),
            chars: input.chars().count(),
            words: input.split_whitespace().count(),
            lines: input.lines().count(),
            ..Self::default()
        };

        stats.count_nodes(nodes, 1);
        stats
    }

    fn count_nodes(&mut self, nodes: &[Node], depth: usize) {
        for node in nodes {
            let Some(element) = node.as_element() else {
                continue;
            };
            self.elements += 1;
            self.max_depth = self.max_depth.max(depth);
            if element.tag == "ruby" {
                self.ruby += 1;
            }
            *self.tags.entry(element.tag.clone()).or_insert(0) += 1;
            self.count_nodes(element.children.as_slice(), depth + 1);
        }
    }
}
