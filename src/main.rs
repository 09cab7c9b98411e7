// ABOUTME: Thin CLI shell: parses args, initializes logging, hands off to the library's interpret()

use clap::Parser;
use rpal::ast::Node;
use rpal::{interpret, token, Config};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Interpreter for RPAL: tokenizer, recursive-descent parser, standardizer,
/// control-structure generator, and CSE machine.
#[derive(Parser, Debug)]
#[command(name = "rpal")]
#[command(version)]
#[command(about = "An interpreter for RPAL")]
struct CliArgs {
    /// Source file to interpret (reads stdin when omitted)
    #[arg(value_name = "FILE")]
    path: Option<PathBuf>,

    /// Dump the parsed AST before standardization
    #[arg(long)]
    ast: bool,

    /// Dump the standardized tree
    #[arg(long)]
    st: bool,

    /// Dump the token stream and exit without evaluating
    #[arg(long)]
    tokens: bool,

    /// Maximum CSE machine steps before aborting a runaway computation
    #[arg(long, value_name = "N")]
    step_budget: Option<usize>,

    /// Log level (overrides RUST_LOG): error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rpal=warn")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn read_source(path: Option<&PathBuf>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Renders a tree as an indented outline, the simplest serialization that
/// satisfies the core's "host decides how to serialize trees" contract.
fn dump_tree(node: &Node, depth: usize) {
    println!("{}{}", "  ".repeat(depth), node.label);
    for child in &node.children {
        dump_tree(child, depth + 1);
    }
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.log_level.as_deref());

    let source = match read_source(args.path.as_ref()) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Cannot read source: {err}");
            return ExitCode::FAILURE;
        }
    };

    if args.tokens {
        let (tokens, warnings) = token::tokenize(&source);
        for token in &tokens {
            println!("{token}");
        }
        for warning in &warnings {
            eprintln!("warning: {warning}");
        }
        return ExitCode::SUCCESS;
    }

    let config = Config {
        step_budget: args.step_budget,
        dump_ast: args.ast,
        dump_st: args.st,
    };

    match interpret(&source, &config) {
        Ok(result) => {
            for warning in &result.warnings {
                eprintln!("warning: {warning}");
            }
            if let Some(ast) = &result.ast {
                println!("--- ast ---");
                dump_tree(ast, 0);
            }
            if let Some(st) = &result.st {
                println!("--- st ---");
                dump_tree(st, 0);
            }
            print!("{}", result.output);
            if result.output.is_empty() {
                println!("{}", result.value);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
