//! kgstore CLI - Command-line interface for the knowledge graph store

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use kgstore::config::{self, KgConfig};
use kgstore::server::{self, AppState};
use kgstore::{ui, ExtractionTracker, GraphStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kgstore")]
#[command(version)]
#[command(about = "Deduplicating SQLite store for small knowledge graphs")]
#[command(long_about = r#"
kgstore persists typed entities, typed relationships, aliases and a full-graph
snapshot. Every insert is get-or-create: repeating a call returns the same id.

Example usage:
  kgstore add-node --json '{"id":"n1","name":"Cell","aliases":["cell"]}' --category Concept
  kgstore add-edge --json '{"subject":"n1","predicate":"part_of","object":"n2"}'
  kgstore ingest --file graph.json
  kgstore serve --port 8000
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to ./kgstore.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its schema
    Init {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Get or create a node from a JSON record
    AddNode {
        /// Node record, e.g. {"id":"n1","name":"Cell"}
        #[arg(short, long)]
        json: String,

        /// Category name (defaults to the configured default category)
        #[arg(short, long)]
        category: Option<String>,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Get or create an edge between two existing nodes
    AddEdge {
        /// Edge record, e.g. {"subject":"n1","predicate":"part_of","object":"n2"}
        #[arg(short, long)]
        json: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Ingest a {nodes, edges} graph file and snapshot it
    Ingest {
        /// Path to the graph JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Category for nodes without entity_type/category
        #[arg(short, long)]
        category: Option<String>,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show a node with its aliases and edges
    Show {
        /// External identifier of the node
        #[arg(short, long)]
        id: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Search nodes by name, description or alias
    Search {
        /// Search query
        #[arg(short, long)]
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Print the stored graph snapshot
    Snapshot {
        /// Pretty-print the payload
        #[arg(long)]
        pretty: bool,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show row counts for every table
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Serve the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Graph id the API answers for
        #[arg(short, long)]
        graph_id: Option<String>,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Write a kgstore.toml with the defaults
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = run(cli) {
        ui::error(&format!("{:#}", err));
        std::process::exit(1);
    }
}

fn open_store(config: &KgConfig, database: Option<PathBuf>) -> anyhow::Result<(GraphStore, PathBuf)> {
    let cwd = std::env::current_dir()?;
    let path = config.database_path(database, &cwd);
    if config::is_in_memory(&path) {
        ui::warn("Using an in-memory database; nothing is kept after exit");
        return Ok((GraphStore::open_in_memory()?, path));
    }

    config::ensure_db_dir(&path)?;
    let store = GraphStore::open_with_timeout(&path, config.busy_timeout())
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok((store, path))
}

fn parse_json(text: &str) -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(text).context("record is not valid JSON")
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    match cli.command {
        Commands::Init { database } => {
            let (_store, path) = open_store(&config, database)?;
            ui::success(&format!("Database ready at {}", path.display()));
        }

        Commands::AddNode { json, category, database } => {
            let (store, _) = open_store(&config, database)?;
            let record = parse_json(&json)?;
            let category = category.unwrap_or_else(|| config.default_category().to_string());
            let id = store.resolve_or_create_node(&record, &category)?;
            ui::success(&format!("Node id {}", id));
        }

        Commands::AddEdge { json, database } => {
            let (store, _) = open_store(&config, database)?;
            let record = parse_json(&json)?;
            let id = store.resolve_or_create_edge(&record)?;
            ui::success(&format!("Edge id {}", id));
        }

        Commands::Ingest { file, category, database } => {
            let (store, path) = open_store(&config, database)?;
            let payload = read_graph_file(&file)?;
            let category = category.unwrap_or_else(|| config.default_category().to_string());

            ui::info("Graph", &file.display().to_string());
            ui::info("Database", &path.display().to_string());
            let report = kgstore::ingest_graph(&store, &payload, &category)?;
            println!("{}", report);
            ui::success("Snapshot stored");
        }

        Commands::Show { id, database } => {
            let (store, _) = open_store(&config, database)?;
            let node = store
                .node_by_external_id(&id)?
                .with_context(|| format!("no node with id {:?}", id))?;
            let aliases = store.node_aliases(node.id)?;
            let edges = store.node_edges(node.id)?;

            ui::section(&node.name);
            ui::info("ID", &node.external_id);
            ui::info("Category", &node.category);
            if let Some(description) = &node.description {
                ui::info("Description", description);
            }
            if !aliases.is_empty() {
                ui::info("Aliases", &aliases.join(", "));
            }
            if !edges.outbound.is_empty() {
                ui::section("Outbound");
                println!("{}", ui::edges_table(&edges.outbound));
            }
            if !edges.inbound.is_empty() {
                ui::section("Inbound");
                println!("{}", ui::edges_table(&edges.inbound));
            }
        }

        Commands::Search { query, limit, database } => {
            let (store, _) = open_store(&config, database)?;
            let results = store.search_nodes(&query, limit)?;
            if results.is_empty() {
                ui::warn(&format!("No nodes match {:?}", query));
            } else {
                println!("{}", ui::nodes_table(&results));
            }
        }

        Commands::Snapshot { pretty, database } => {
            let (store, _) = open_store(&config, database)?;
            match store.latest_snapshot()? {
                Some(snapshot) => {
                    ui::info("Stored at", &snapshot.created_at.to_rfc3339());
                    if pretty {
                        println!("{}", serde_json::to_string_pretty(&snapshot.payload_value()?)?);
                    } else {
                        println!("{}", snapshot.payload);
                    }
                }
                None => ui::warn("No snapshot stored yet"),
            }
        }

        Commands::Stats { database } => {
            let (store, path) = open_store(&config, database)?;
            ui::section(&format!("kgstore ({})", path.display()));
            println!("{}", ui::stats_table(&store.stats()?));
        }

        Commands::Serve { port, graph_id, database } => {
            let (store, path) = open_store(&config, database)?;
            let port = port.unwrap_or_else(|| config.port());
            let graph_id = graph_id.unwrap_or_else(|| config.graph_id().to_string());
            tracing::info!("Serving {} from {}", graph_id, path.display());

            let tracker = ExtractionTracker::new(config.transition());
            let state = AppState::new(store, tracker, graph_id);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::start_server(port, state))?;
        }

        Commands::InitConfig { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            let cwd = std::env::current_dir()?;
            let defaults = KgConfig {
                database: Some(config::default_database_path_in(&cwd).display().to_string()),
                default_category: Some(config::DEFAULT_CATEGORY.to_string()),
                graph_id: Some(config::DEFAULT_GRAPH_ID.to_string()),
                port: Some(config::DEFAULT_PORT),
                transition_ms: None,
                busy_timeout_ms: None,
            };
            config::write_config(&path, &defaults, force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

fn read_graph_file(path: &Path) -> anyhow::Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not valid JSON", path.display()))
}
