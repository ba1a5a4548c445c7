//! Maintenance CLI over a persisted graph cache.
//!
//! # Responsibility
//! - Inspect a cache file written by the desktop shell.
//! - Commands never save graph data back to the cache.

use clap::{Parser, Subcommand};
use notegraph_core::{GraphConfig, GraphEngine};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "notegraph")]
#[command(author, version, about = "Inspect a NoteGraph knowledge graph cache")]
#[command(propagate_version = true)]
struct Cli {
    /// Graph cache file (SQLite)
    #[arg(short, long, env = "NOTEGRAPH_CACHE_PATH")]
    cache: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Node and edge counts
    Stats,

    /// Rank nodes whose names match a query
    Search {
        query: String,

        /// Maximum hits
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Render the whole graph
    Export {
        /// `json` or `dot`
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Breadth-first neighborhood of one node
    Subgraph {
        node_id: Uuid,

        #[arg(short, long, default_value_t = 1)]
        depth: i64,

        #[arg(short, long)]
        max_nodes: Option<i64>,
    },

    /// Edges incident to one node
    Connections { node_id: Uuid },

    /// Print core linkage info
    Ping,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Ping = cli.command {
        println!("notegraph_core ping={}", notegraph_core::ping());
        println!("notegraph_core version={}", notegraph_core::core_version());
        return Ok(());
    }

    if !cli.cache.exists() {
        return Err(format!("cache file `{}` does not exist", cli.cache.display()).into());
    }
    let config = GraphConfig {
        worker_count: 1,
        ..GraphConfig::from_env()?
    };
    let engine = GraphEngine::open_with_cache(config, &cli.cache)?;

    match cli.command {
        Commands::Stats => print_json(&engine.get_stats())?,
        Commands::Search { query, limit } => print_json(&engine.search(&query, limit)?)?,
        Commands::Export { format, output } => {
            let rendered = engine.export_graph(&format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    eprintln!("Wrote {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Subgraph {
            node_id,
            depth,
            max_nodes,
        } => {
            let subgraph = match max_nodes {
                Some(cap) => engine.get_subgraph_bounded(node_id, depth, cap)?,
                None => engine.get_subgraph(node_id, depth)?,
            };
            print_json(&subgraph)?;
        }
        Commands::Connections { node_id } => {
            print_json(&engine.get_node_connections(node_id)?)?
        }
        Commands::Ping => {}
    }
    engine.shutdown();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
