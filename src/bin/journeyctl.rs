//! journeyctl - journey export/import/prune CLI
//!
//! Drives the journey kernel against a live platform over REST.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: log level filter (default: warn)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development
//!   (default: pretty)
//!
//! ## Usage
//!
//! ```bash
//! journeyctl export -h https://am.example.com -u amadmin -p secret -t Login -f login.json
//! ```

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use journey_kernel::{
    describe_all, list_journeys, Catalog, CombinedBundle, Confirm, ConnectionParams, DirSink,
    ExportEngine, ImportEngine, ImportMode, NodeSummary, PruneEngine, PruneOutcome, ResolvedGraph,
    RestPlatform, Session, SessionManager, TreeSummary,
};

/// Initialize the tracing subscriber with JSON or pretty format.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "journeyctl=warn,journey_kernel=warn".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}

/// Manage authentication journeys: export, import, describe, prune.
#[derive(Parser)]
#[command(name = "journeyctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Platform base URL.
    #[arg(short = 'H', long, global = true)]
    host: Option<String>,

    /// Administrative user.
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Administrative password.
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Realm to operate in.
    #[arg(short, long, global = true, default_value = "/")]
    realm: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show platform topology, version, and session state.
    Info,
    /// List journeys in the realm; `*` marks custom content.
    List,
    /// Describe a journey, every journey, or an export file.
    Describe {
        /// Journey to describe; all journeys when omitted.
        #[arg(short, long)]
        tree: Option<String>,
        /// Describe an export file instead of a live journey.
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Export one journey.
    Export {
        /// Journey to export.
        #[arg(short, long)]
        tree: String,
        /// Output file; prints to stdout when omitted.
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Export every journey into one bundle file.
    ExportAll {
        /// Output file.
        #[arg(short, long, default_value = "journeys.json")]
        file: String,
    },
    /// Export every journey to its own <name>.json file.
    ExportAllSeparate,
    /// Import one journey export file.
    Import {
        /// Input file.
        #[arg(short, long)]
        file: String,
        /// Keep artifact ids instead of regenerating them.
        #[arg(long)]
        noreuuid: bool,
    },
    /// Import a whole-realm bundle file.
    ImportAll {
        /// Input file.
        #[arg(short, long, default_value = "journeys.json")]
        file: String,
        /// Keep artifact ids instead of regenerating them.
        #[arg(long)]
        noreuuid: bool,
    },
    /// Import every <name>.json file in the current directory.
    ImportAllSeparate {
        /// Keep artifact ids instead of regenerating them.
        #[arg(long)]
        noreuuid: bool,
    },
    /// Delete nodes unreachable from every journey root.
    Prune,
}

fn mode_for(noreuuid: bool) -> ImportMode {
    if noreuuid {
        ImportMode::PreserveIdentity
    } else {
        ImportMode::RegenerateIdentity
    }
}

async fn connect(cli: &Cli) -> Result<(Arc<RestPlatform>, Session), Box<dyn Error>> {
    let host = cli.host.clone().ok_or("missing --host")?;
    let user = cli.user.clone().ok_or("missing --user")?;
    let password = cli.password.clone().ok_or("missing --password")?;
    let params = ConnectionParams::new(host.clone(), user, password, cli.realm.clone());

    let client = Arc::new(RestPlatform::new(&host)?);
    let session = SessionManager::new(Arc::clone(&client))
        .authenticate(&params)
        .await?;
    Ok((client, session))
}

fn print_summary(summary: &TreeSummary) {
    println!("\n==========");
    println!("Tree name: {}", summary.journey);
    println!("Nodes:");
    for (name, count) in &summary.node_types {
        println!("\t- {name}: {count}");
    }
    println!("Scripts (Name: Description):");
    for (name, desc) in &summary.scripts {
        println!("\t- {name}: {desc}");
    }
    println!("==========");
}

/// Reads a y/n answer from the terminal for the prune confirmation.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, orphans: &[NodeSummary]) -> bool {
        println!("Orphaned nodes:");
        for orphan in orphans {
            println!("\t- {} ({})", orphan.id, orphan.node_type);
        }
        print!("Delete these {} node(s)? [y/N] ", orphans.len());
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Parse an export file as a single-journey document or a raw graph.
fn read_graph_file(path: &str) -> Result<ResolvedGraph, Box<dyn Error>> {
    let contents = std::fs::read_to_string(path)?;
    if let Ok((_, graph)) = journey_kernel::export::parse_single(&contents) {
        return Ok(graph);
    }
    Ok(journey_kernel::export::parse_graph(&contents)?)
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Commands::Info => {
            let (_, session) = connect(&cli).await?;
            println!("Host:      {}", session.host());
            println!("Realm:     {}", session.realm());
            println!("Topology:  {}", session.topology());
            println!("Version:   {}", session.platform_version());
            println!("Privilege: {:?}", session.state());
        }
        Commands::List => {
            let (client, session) = connect(&cli).await?;
            let entries = list_journeys(&client, &session).await?;
            println!("List of journeys in realm {}", session.realm());
            for entry in entries {
                let marker = if entry.contains_custom { " *" } else { "" };
                println!("- {}{}", entry.name, marker);
            }
            println!("(*) Journey contains custom node(s).");
        }
        Commands::Describe { tree, file } => {
            if let Some(file) = file {
                let graph = read_graph_file(file)?;
                let catalog = Catalog::for_version(&graph.meta.platform_version);
                for summary in describe_all(&graph, catalog) {
                    print_summary(&summary);
                }
            } else {
                let (client, session) = connect(&cli).await?;
                let engine = ExportEngine::new(Arc::clone(&client));
                let catalog = Catalog::for_version(session.platform_version());
                let names: Vec<String> = match tree {
                    Some(tree) => vec![tree.clone()],
                    None => list_journeys(&client, &session)
                        .await?
                        .into_iter()
                        .map(|e| e.name)
                        .collect(),
                };
                for name in names {
                    let graph = engine.single(&session, &name).await?;
                    for summary in describe_all(&graph, catalog) {
                        print_summary(&summary);
                    }
                }
            }
        }
        Commands::Export { tree, file } => {
            let (client, session) = connect(&cli).await?;
            let engine = ExportEngine::new(Arc::clone(&client));
            match file {
                Some(file) => {
                    let mut sink = DirSink::new(".");
                    engine.single_to_sink(&session, tree, file, &mut sink).await?;
                    println!("Exported {} to {}", tree, file);
                }
                None => {
                    let graph = engine.single(&session, tree).await?;
                    println!("{}", journey_kernel::export::render_single_display(tree, &graph)?);
                }
            }
        }
        Commands::ExportAll { file } => {
            let (client, session) = connect(&cli).await?;
            let engine = ExportEngine::new(Arc::clone(&client));
            let mut sink = DirSink::new(".");
            let report = engine.combined_to_sink(&session, file, &mut sink).await?;
            println!(
                "Exported {} journey(s) to {} ({} failed)",
                report.succeeded.len(),
                file,
                report.failed.len()
            );
            for (name, reason) in &report.failed {
                eprintln!("failed: {name}: {reason}");
            }
        }
        Commands::ExportAllSeparate => {
            let (client, session) = connect(&cli).await?;
            let engine = ExportEngine::new(Arc::clone(&client));
            let mut sink = DirSink::new(".");
            let report = engine.separate(&session, &mut sink).await?;
            println!(
                "Exported {} journey(s) ({} failed)",
                report.succeeded.len(),
                report.failed.len()
            );
            for (name, reason) in &report.failed {
                eprintln!("failed: {name}: {reason}");
            }
        }
        Commands::Import { file, noreuuid } => {
            let (client, session) = connect(&cli).await?;
            let graph = read_graph_file(file)?;
            let engine = ImportEngine::new(Arc::clone(&client));
            let summaries = engine
                .import_single(&session, &graph, mode_for(*noreuuid))
                .await?;
            for summary in summaries {
                println!(
                    "Imported {}: {} node(s), {} script(s), {} id(s) regenerated",
                    summary.journey,
                    summary.nodes_written + summary.inner_nodes_written,
                    summary.scripts_written,
                    summary.ids_regenerated
                );
            }
        }
        Commands::ImportAll { file, noreuuid } => {
            let (client, session) = connect(&cli).await?;
            let contents = std::fs::read_to_string(file)?;
            let bundle = journey_kernel::export::parse_combined(&contents)?;
            let engine = ImportEngine::new(Arc::clone(&client));
            let (_, report) = engine
                .import_bundle(&session, &bundle, mode_for(*noreuuid))
                .await?;
            println!(
                "Imported {} journey(s) ({} failed)",
                report.succeeded.len(),
                report.failed.len()
            );
            for (name, reason) in &report.failed {
                eprintln!("failed: {name}: {reason}");
            }
        }
        Commands::ImportAllSeparate { noreuuid } => {
            let (client, session) = connect(&cli).await?;
            let mut bundle = CombinedBundle::new();
            for entry in std::fs::read_dir(".")? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let contents = std::fs::read_to_string(&path)?;
                    match journey_kernel::export::parse_graph(&contents) {
                        Ok(graph) => bundle.insert(graph),
                        Err(_) => eprintln!("skipping {}: not a journey export", path.display()),
                    }
                }
            }
            let engine = ImportEngine::new(Arc::clone(&client));
            let (_, report) = engine
                .import_bundle(&session, &bundle, mode_for(*noreuuid))
                .await?;
            println!(
                "Imported {} journey(s) ({} failed)",
                report.succeeded.len(),
                report.failed.len()
            );
            for (name, reason) in &report.failed {
                eprintln!("failed: {name}: {reason}");
            }
        }
        Commands::Prune => {
            let (client, session) = connect(&cli).await?;
            let engine = PruneEngine::new(Arc::clone(&client));
            match engine.prune(&session, &mut StdinConfirm).await? {
                PruneOutcome::Declined => println!("Declined, nothing deleted."),
                PruneOutcome::Completed(report) => {
                    println!(
                        "Pruned: {} deleted, {} failed, {} skipped",
                        report.deleted.len(),
                        report.failed.len(),
                        report.skipped.len()
                    );
                    for (id, reason) in &report.failed {
                        eprintln!("failed: {id}: {reason}");
                    }
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("ERROR: {error}");
        std::process::exit(1);
    }
}
