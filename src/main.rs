//! Circuit Elaborator CLI
//!
//! Usage:
//!   circuit-elaborator [OPTIONS] [FILE]
//!
//! Options:
//!   -m, --module <NAME>    Elaborate this module instead of the document entry
//!   -p, --param <K=V>      Override a top-level parameter (repeatable)
//!   -c, --config <FILE>    Layout configuration (TOML format)
//!   --compact              Print compact JSON
//!   -v, --verbose          Raise log verbosity (repeatable)
//!   -h, --help             Print help

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use circuit_elaborator::{
    elaborate_document, elaborate_module, CircuitDocument, ElabError, LayoutConfig, Params,
    PipelineConfig, PipelineError, Value,
};

#[derive(Parser)]
#[command(name = "circuit-elaborator")]
#[command(about = "Elaborate hierarchical circuit templates into positioned instance graphs")]
struct Cli {
    /// Input JSON document (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Module to elaborate instead of the document's entry point
    #[arg(short, long)]
    module: Option<String>,

    /// Top-level parameter override as NAME=VALUE; VALUE is parsed as JSON
    /// and falls back to a plain string
    #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Layout configuration file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print compact instead of pretty JSON
    #[arg(long)]
    compact: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("parameter name is empty".to_string());
    }
    let value = serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::from(value));
    Ok((name.to_string(), value))
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with_writer(io::stderr)
        .init();

    let layout = match &cli.config {
        Some(path) => match LayoutConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading layout config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => LayoutConfig::default(),
    };

    let (source_name, source) = match &cli.input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => (path.display().to_string(), content),
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => ("<stdin>".to_string(), buffer),
                Err(e) => {
                    eprintln!("Error reading from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let doc = match CircuitDocument::from_json(&source) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error in '{}': {}", source_name, e);
            std::process::exit(1);
        }
    };

    let parameters: Params = cli.params.into_iter().collect();
    let config = PipelineConfig::new()
        .with_layout(layout)
        .with_parameters(parameters);

    tracing::info!(entry = %cli.module.as_deref().unwrap_or(&doc.entry), "elaborating");
    let result = match &cli.module {
        Some(name) => elaborate_module(&doc, name, &config),
        None => elaborate_document(&doc, &config),
    };

    match result.and_then(|graph| {
        graph
            .to_json(!cli.compact)
            .map_err(|e| PipelineError::Document(e.into()))
    }) {
        Ok(json) => println!("{}", json),
        Err(PipelineError::Elaboration(ElabError::Expression(e))) => {
            eprint!("{}", e.format(&source_name));
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
