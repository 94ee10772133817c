//! Reftree Administration CLI

mod json_tree;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reftree_core::{Diff, NodeKind, RefTree, StringKey, VersionedTree};
use std::io::Read;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Store = VersionedTree<StringKey, String>;

#[derive(Parser, Debug)]
#[command(name = "reftree-admin")]
#[command(author = "Reftree Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Reftree versioned store administration tool")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a new store holding a root-only tree
    Init {
        path: String,
        #[arg(long, default_value = "root")]
        root: String,
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Commit a JSON tree file ("-" for stdin) as the next version
    Commit {
        #[arg(short, long)]
        repo: String,
        #[arg(short, long)]
        file: String,
    },

    /// List retained versions
    Log {
        #[arg(short, long)]
        repo: String,
    },

    /// Print a version as a JSON tree
    Show {
        #[arg(short, long)]
        repo: String,
        /// Defaults to the current version
        #[arg(short, long)]
        version: Option<u64>,
    },

    /// Print a version relative to another
    Diff {
        #[arg(short, long)]
        repo: String,
        #[arg(long)]
        from: u64,
        /// Defaults to the current version
        #[arg(long)]
        to: Option<u64>,
    },

    /// Reconstruct every retained version
    Verify {
        #[arg(short, long)]
        repo: String,
        #[arg(short, long)]
        quiet: bool,
    },

    /// Drop history older than a version
    Prune {
        #[arg(short, long)]
        repo: String,
        #[arg(long)]
        before: u64,
    },
}

fn open_store(repo: &str) -> Result<Store> {
    Store::open(Path::new(repo)).with_context(|| format!("Failed to open store at {}", repo))
}

fn format_time(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut data = String::new();
        std::io::stdin()
            .read_to_string(&mut data)
            .context("Failed to read tree from stdin")?;
        Ok(data)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))
    }
}

fn print_diff(diff: &Diff<StringKey, String>) {
    let mut depths: Vec<usize> = Vec::with_capacity(diff.len());
    for node in diff.nodes() {
        let depth = node.parent.map_or(0, |p| depths[p as usize] + 1);
        depths.push(depth);
        let indent = "  ".repeat(depth);
        match &node.kind {
            NodeKind::Content(content) => println!("{}{} = {:?}", indent, node.id, content),
            NodeKind::TreeRef(_) => println!("{}{} (unchanged)", indent, node.id),
            NodeKind::NodeRef(target) if *target == node.id => {
                println!("{}{} (moved, unchanged)", indent, node.id)
            }
            NodeKind::NodeRef(target) => println!("{}{} (copy of {})", indent, node.id, target),
        }
    }
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::Init {
            path,
            root,
            content,
        } => {
            info!("Initializing store at {}", path);
            let store = Store::create(Path::new(&path), StringKey::new(root), content)
                .with_context(|| format!("Failed to initialize store at {}", path))?;
            println!("Store initialized successfully (ID: {})", store.store_id());
        }

        Commands::Commit { repo, file } => {
            let mut store = open_store(&repo)?;
            let json: json_tree::JsonNode =
                serde_json::from_str(&read_input(&file)?).context("Invalid JSON tree")?;
            let tree = json_tree::to_tree(&json)?;
            if tree.root_id() != store.current().root_id() {
                bail!(
                    "Tree root '{}' does not match store root '{}'",
                    tree.root_id(),
                    store.current().root_id()
                );
            }
            let version = store.commit(&tree)?;
            println!("Committed version {}", version);
        }

        Commands::Log { repo } => {
            let store = open_store(&repo)?;
            println!("Store {} (created {})", store.store_id(), format_time(store.created_at()));
            for info in store.history()?.iter().rev() {
                match (info.reverse_nodes, info.stored_bytes) {
                    (Some(nodes), Some(bytes)) => println!(
                        "v{:<6} {}  {} reverse nodes, {} bytes",
                        info.version,
                        format_time(info.committed_at),
                        nodes,
                        bytes
                    ),
                    _ => println!("v{:<6} {}  (current)", info.version, format_time(info.committed_at)),
                }
            }
        }

        Commands::Show { repo, version } => {
            let store = open_store(&repo)?;
            let version = version.unwrap_or(store.version());
            let tree = store.get_version(version)?;
            let json = json_tree::from_tree(&*tree)?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }

        Commands::Diff { repo, from, to } => {
            let store = open_store(&repo)?;
            let to = to.unwrap_or(store.version());
            let diff = store.referenced_view(to, from)?;
            println!("v{} relative to v{} ({} nodes, {} references)", to, from, diff.len(), diff.ref_count());
            print_diff(&diff);
        }

        Commands::Verify { repo, quiet } => {
            let store = open_store(&repo)?;
            let checks = store
                .verify()
                .with_context(|| format!("Store at {} failed verification", repo))?;
            if !quiet {
                for check in &checks {
                    println!("  v{}: {} nodes", check.version, check.nodes);
                }
            }
            println!("Verified {} versions", checks.len());
        }

        Commands::Prune { repo, before } => {
            let mut store = open_store(&repo)?;
            let removed = store.prune_before(before)?;
            println!("Removed {} reverse deltas; oldest version is now {}", removed, store.oldest_version()?);
        }
    }

    Ok(())
}
