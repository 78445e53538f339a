//! Trellis CLI - build, inspect and reverse the repository graph.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trellis::graph::extract::{self, NodeTextExtractor};
use trellis::graph::GraphLoader;
use trellis::{build_graph, external_dependency_imports, TrellisConfig};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Trellis - structural knowledge graph for source repositories", long_about = None)]
struct Cli {
    /// Repository root directory (default: current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the repository, build the graph, write the JSON export
    Index {
        /// Output path (default: from trellis.toml, else trellis_graph.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recover source text for graph nodes by id
    Extract {
        /// Path to the exported graph JSON
        #[arg(short, long)]
        graph: PathBuf,

        /// Node ids to extract
        #[arg(required_unless_present = "ids_file")]
        node_ids: Vec<u64>,

        /// Read ids from a file (one per line, # comments)
        #[arg(long)]
        ids_file: Option<PathBuf>,

        /// Emit one JSON object per result line
        #[arg(long)]
        jsonl: bool,

        /// Print full file content instead of the code slice
        #[arg(long)]
        full_file: bool,
    },

    /// Show node and relationship counts for an export
    Stats {
        /// Path to the exported graph JSON
        graph: PathBuf,
    },

    /// Show which modules import an external dependency
    Deps {
        /// Path to the exported graph JSON
        graph: PathBuf,

        /// Package name (default: first alphabetically)
        #[arg(short, long)]
        package: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Index { output } => {
            let config = TrellisConfig::load(&cli.root.join("trellis.toml"));
            let output_path = output.unwrap_or_else(|| config.resolve_output_path(&cli.root));
            let data = build_graph(&cli.root, &config, &output_path)
                .with_context(|| format!("indexing {}", cli.root.display()))?;
            println!(
                "✓ Indexed {} nodes, {} relationships -> {}",
                data.metadata.total_nodes,
                data.metadata.total_relationships,
                output_path.display()
            );
        }

        Commands::Extract {
            graph,
            mut node_ids,
            ids_file,
            jsonl,
            full_file,
        } => {
            if let Some(ids_file) = ids_file {
                node_ids.extend(extract::read_node_ids_from_file(&ids_file)?);
            }
            let loader = GraphLoader::load(&graph)?;
            let mut extractor = NodeTextExtractor::new(&loader, &cli.root);
            let results = extractor.extract_batch(&node_ids);

            if jsonl {
                println!("{}", extract::results_to_jsonl(&node_ids, &results));
                return Ok(());
            }

            for (node_id, result) in &results {
                println!("=== Node {node_id} ===");
                println!("qualified_name: {}", result.qualified_name.as_deref().unwrap_or("-"));
                if let Some(path) = &result.file_path {
                    println!("file_path: {}", path.display());
                }
                if let (Some(start), Some(end)) = (result.start_line, result.end_line) {
                    println!("lines: {start}-{end}");
                }
                match &result.error {
                    Some(error) => println!("error: {error}"),
                    None => {
                        let content = if full_file {
                            result.file_content.as_deref()
                        } else {
                            result.code_chunk.as_deref()
                        };
                        println!("\n{}\n", content.unwrap_or(""));
                    }
                }
            }
        }

        Commands::Stats { graph } => {
            let loader = GraphLoader::load(&graph)?;
            let metadata = loader.metadata();
            println!("nodes: {}", metadata.total_nodes);
            println!("relationships: {}", metadata.total_relationships);
            println!("exported_at: {}", metadata.exported_at);

            let mut by_label: std::collections::BTreeMap<&str, usize> = Default::default();
            for node in loader.nodes() {
                *by_label.entry(node.primary_label()).or_default() += 1;
            }
            for (label, count) in by_label {
                println!("  {label}: {count}");
            }
        }

        Commands::Deps { graph, package } => {
            let loader = GraphLoader::load(&graph)?;
            let report = external_dependency_imports(&loader, package.as_deref())?;
            println!(
                "{} {} (project: {})",
                report.external_package,
                report.version_spec,
                if report.project_name.is_empty() {
                    "-"
                } else {
                    report.project_name.as_str()
                }
            );
            println!("imported by {} module(s)", report.import_count);
            for importer in &report.importing_modules {
                println!("  {} ({}) -> {}", importer.module, importer.file_path, importer.imported_entity);
            }
        }
    }

    Ok(())
}
