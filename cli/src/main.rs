//! Tessera command-line tool
//!
//! Loads a schema and JSON fixtures into an in-memory store and runs one
//! lookup against it, printing the result as JSON.
//!
//! Usage:
//!   tessera --schema schema.json --fixtures fixtures.json find person 1
//!   tessera --schema schema.json --fixtures fixtures.json related person 1 dogs

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tessera_cli::{build_store, execute, load_config, load_fixtures, load_schema, Command};
use tessera_store::{MemoryAdapter, StoreConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Query a fixture-backed Tessera store")]
struct Args {
    /// Path to the schema (JSON array of entity types)
    #[arg(short, long)]
    schema: PathBuf,

    /// Path to fixtures (JSON object of type to payloads)
    #[arg(short, long)]
    fixtures: Option<PathBuf>,

    /// Path to a store config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let schema = load_schema(&args.schema)?;
    let adapter = match &args.fixtures {
        Some(path) => load_fixtures(path)?,
        None => MemoryAdapter::new(),
    };
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => StoreConfig::default(),
    };
    info!("Loaded {} entity types", schema.len());

    let store = build_store(schema, adapter, config);
    let output = execute(&store, &args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
