//! CLI for the retrieval engine.
//!
//! The binary is a thin stand-in for the routing layer: it parses
//! arguments and calls the two pipeline entrypoints.

pub mod commands;

use clap::{Parser, Subcommand};

/// Knowledge-base retrieval engine.
#[derive(Debug, Parser)]
#[command(name = "kbrag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest text into the vector store
    Ingest(commands::IngestArgs),

    /// Query the store and generate an answer
    Query(commands::QueryArgs),

    /// Show store statistics
    Stats,
}
