//! # Blockwise - Block Document Tool
//!
//! Converts and checks Blockwise documents from the command line.
//!
//! ## Quick Start
//!
//! ```bash
//! # Render a document as HTML, Markdown or an email body
//! cargo run -- export --format markdown doc.json
//!
//! # Turn an HTML page into a document
//! cargo run -- import page.html > doc.json
//!
//! # Validate a document against the stock plugins
//! cargo run -- check doc.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blockwise_core::{Config, ContentStore, Format, PluginRegistry};
use blockwise_export::{Exporter, Importer};

/// Blockwise - convert and check block documents
#[derive(Parser, Debug)]
#[command(name = "blockwise")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serialize a JSON document
    Export {
        /// Output format: html, markdown or email
        #[arg(short, long, default_value = "html", value_parser = parse_format)]
        format: Format,

        #[arg(value_name = "DOC")]
        file: PathBuf,
    },

    /// Convert an HTML page into a JSON document
    Import {
        #[arg(value_name = "PAGE")]
        file: PathBuf,
    },

    /// Validate a JSON document
    Check {
        #[arg(value_name = "DOC")]
        file: PathBuf,
    },
}

fn parse_format(s: &str) -> Result<Format, String> {
    Format::parse(s).ok_or_else(|| format!("unknown format '{s}' (expected html, markdown or email)"))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load()),
    }
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_document(path: &Path, registry: &PluginRegistry, config: &Config) -> anyhow::Result<ContentStore> {
    let json = read(path)?;
    ContentStore::from_json(&json, registry, config.editor.load_policy)
        .with_context(|| format!("Failed to load document {}", path.display()))
}

/// Runs one command and returns what it prints.
fn run(command: &Command, config: &Config) -> anyhow::Result<String> {
    let registry = blockwise_plugins::default_registry()?;

    match command {
        Command::Export { format, file } => {
            let store = load_document(file, &registry, config)?;
            let exporter = Exporter::with_config(&registry, config.export.clone());
            Ok(match format {
                Format::Html => exporter.to_html(&store),
                Format::Markdown => exporter.to_markdown(&store),
                Format::Email => exporter.to_email_html(&store),
            })
        }
        Command::Import { file } => {
            let html = read(file)?;
            let store = Importer::with_config(&registry, &config.editor)
                .import(&html)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            Ok(store.to_json_pretty()?)
        }
        Command::Check { file } => {
            let store = load_document(file, &registry, config)?;
            store.validate(&registry)?;
            Ok(format!("{}: {} blocks, ok", file.display(), store.len()))
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    tracing::info!("Starting Blockwise v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_deref())?;
    let output = run(&args.command, &config)?;
    println!("{output}");

    Ok(())
}
