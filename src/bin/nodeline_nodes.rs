//! CLI entry point for nodeline-nodes: read-only registry inspection tool.
//!
//! The running server is the registry's only writer; this tool never
//! modifies the file.

use clap::{Parser, Subcommand};
use nodeline::registry::{encode, load, NodeSet};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nodeline-nodes", about = "nodeline registry inspection tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print registered nodes as a table
    List {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Export registered nodes as JSON
    Export {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value = "-")]
        output: String,
    },
}

fn resolve_registry_path(
    config: Option<PathBuf>,
    file: Option<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if let Some(file) = file {
        return Ok(file);
    }
    let config = match config {
        Some(path) => nodeline::config::load_config(path)?,
        None => nodeline::config::Config::default(),
    };
    Ok(PathBuf::from(config.registry.path))
}

fn read_nodes(config: Option<PathBuf>, file: Option<PathBuf>) -> Result<NodeSet, i32> {
    let path = resolve_registry_path(config, file).map_err(|e| {
        eprintln!("Error reading config: {}", e);
        1
    })?;
    load(&path).map_err(|e| {
        eprintln!("Error reading registry: {}", e);
        1
    })
}

fn main() {
    let cli = Cli::parse();
    let rc = match cli.command {
        Commands::List { config, file } => run_list(config, file),
        Commands::Export {
            config,
            file,
            output,
        } => run_export(config, file, output),
    };
    std::process::exit(rc);
}

fn run_list(config: Option<PathBuf>, file: Option<PathBuf>) -> i32 {
    let nodes = match read_nodes(config, file) {
        Ok(nodes) => nodes,
        Err(rc) => return rc,
    };

    let host_width = nodes
        .values()
        .map(|n| n.host.len())
        .max()
        .unwrap_or(0)
        .max("HOST".len());
    println!("{:<36}  {:<host_width$}  PORT", "ID", "HOST");
    for node in nodes.values() {
        println!("{:<36}  {:<host_width$}  {}", node.id, node.host, node.port);
    }
    eprintln!("{} node(s)", nodes.len());
    0
}

fn run_export(config: Option<PathBuf>, file: Option<PathBuf>, output: String) -> i32 {
    let nodes = match read_nodes(config, file) {
        Ok(nodes) => nodes,
        Err(rc) => return rc,
    };

    let data = match encode(&nodes) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Error exporting: {}", e);
            return 1;
        }
    };
    let result = String::from_utf8_lossy(&data);

    if output == "-" {
        println!("{}", result);
    } else {
        if let Err(e) = std::fs::write(&output, format!("{}\n", result)) {
            eprintln!("Error writing output: {}", e);
            return 1;
        }
        eprintln!("Exported {} node(s) to {}", nodes.len(), output);
    }
    0
}
