//! deckrepo - command-line front end for the acquisition engine.
//!
//! Startup order:
//! 1. Initialise tracing from `DECKREPO_LOG` (default `warn`).
//! 2. Resolve the engine configuration (config file, env, platform default).
//! 3. Dispatch the subcommand against the engine crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::debug;

use deckrepo_fetch::{
    Config, ConfigFile, InstallClass, InstallReport, Installer, Orchestrator, ProgressSink,
    RepoApi, SnapshotSource, VideoKind,
};

#[derive(Parser)]
#[command(name = "deckrepo", version, about = "Browse and install Steam Deck boot and suspend videos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the remote catalog.
    List {
        /// Bypass the cache and refetch from the network.
        #[arg(long)]
        refresh: bool,
        /// Show only one kind of video.
        #[arg(long, value_parser = ["boot", "suspend"])]
        kind: Option<String>,
    },
    /// List videos installed in the override directory.
    Installed,
    /// Download and install one or more catalog items by id.
    Install {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete an installed video and its metadata.
    Delete { filename: String },
    /// Resolve the direct download URL for a catalog item.
    Url { id: String },
    /// Print the resolved install directory.
    Path,
    /// Persist a custom install directory.
    SetPath { dir: PathBuf },
}

/// Forwards engine notifications onto a channel drained by `run_install`.
/// Send failures are ignored; the engine must never observe a missing
/// listener.
struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

enum SinkEvent {
    Progress(String, u8),
    Done(String, InstallReport),
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, item_id: &str, percent: u8) {
        let _ = self.tx.send(SinkEvent::Progress(item_id.to_owned(), percent));
    }

    fn on_done(&self, item_id: &str, report: InstallReport) {
        let _ = self.tx.send(SinkEvent::Done(item_id.to_owned(), report));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = Config::from_env();
    debug!(
        install_root = %cfg.install_root.display(),
        base_url = %cfg.base_url,
        "configuration resolved"
    );

    match cli.command {
        Command::List { refresh, kind } => run_list(&cfg, refresh, kind.as_deref()).await,
        Command::Installed => run_installed(&cfg),
        Command::Install { ids } => run_install(&cfg, ids).await,
        Command::Delete { filename } => run_delete(&cfg, &filename),
        Command::Url { id } => run_url(&cfg, &id).await,
        Command::Path => {
            println!("{}", cfg.install_root.display());
            Ok(())
        }
        Command::SetPath { dir } => run_set_path(dir),
    }
}

fn init_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_env("DECKREPO_LOG") {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_list(cfg: &Config, refresh: bool, kind: Option<&str>) -> anyhow::Result<()> {
    let api = RepoApi::new(cfg);
    let snapshot = api.fetch_catalog(refresh).await?;
    if snapshot.source == SnapshotSource::Cache {
        println!("(showing cached catalog; pass --refresh to refetch)");
    }

    let wanted = kind.map(|k| match k {
        "boot" => VideoKind::BootVideo,
        _ => VideoKind::SuspendVideo,
    });

    let mut shown = 0usize;
    for item in &snapshot.items {
        if wanted.is_some_and(|w| item.kind != w) {
            continue;
        }
        let tag = match item.kind {
            VideoKind::BootVideo => "boot",
            VideoKind::SuspendVideo => "suspend",
        };
        println!(
            "{:<8} {:<8} {:<40} by {:<20} {} DLs, {} likes",
            item.id,
            tag,
            item.title,
            item.author(),
            item.download_count,
            item.like_count
        );
        shown += 1;
    }
    println!("{shown} item(s)");
    Ok(())
}

fn run_installed(cfg: &Config) -> anyhow::Result<()> {
    let installer = Installer::new(&cfg.install_root);
    let entries = installer.list_installed();
    if entries.is_empty() {
        println!("No videos installed in {}", cfg.install_root.display());
        return Ok(());
    }

    for entry in entries {
        let class = match entry.install_class {
            InstallClass::Boot => "boot",
            InstallClass::Suspend => "suspend",
        };
        let size_mb = entry.size_bytes as f64 / (1024.0 * 1024.0);
        let title = entry
            .metadata
            .as_ref()
            .map(|m| m.title.as_str())
            .unwrap_or("-");
        println!("{:<40} {:<8} {:>8.2} MB  {}", entry.filename, class, size_mb, title);
    }
    Ok(())
}

async fn run_install(cfg: &Config, ids: Vec<String>) -> anyhow::Result<()> {
    let api = RepoApi::new(cfg);
    let snapshot = api.fetch_catalog(false).await?;

    let installer = Installer::new(&cfg.install_root);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::start(cfg, installer, Arc::new(ChannelSink { tx }));

    let mut pending = 0usize;
    let mut failures = 0usize;
    for id in &ids {
        let Some(item) = snapshot.items.iter().find(|item| &item.id == id) else {
            eprintln!("{id}: not in the catalog");
            failures += 1;
            continue;
        };
        if orchestrator.request_install(item.clone()).await {
            println!("{id}: downloading \"{}\"", item.title);
            pending += 1;
        } else {
            println!("{id}: already downloading");
        }
    }

    let mut last_decile: HashMap<String, u8> = HashMap::new();
    while pending > 0 {
        match rx.recv().await {
            Some(SinkEvent::Progress(id, percent)) => {
                // One line per 10% step keeps the output readable.
                let decile = percent / 10;
                if last_decile.get(&id).copied() != Some(decile) {
                    last_decile.insert(id.clone(), decile);
                    println!("{id}: {percent}%");
                }
            }
            Some(SinkEvent::Done(id, report)) => {
                pending -= 1;
                if report.success {
                    println!("{id}: {}", report.message);
                } else {
                    failures += 1;
                    eprintln!("{id}: {}", report.message);
                }
            }
            None => break,
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} install(s) failed");
    }
    Ok(())
}

fn run_delete(cfg: &Config, filename: &str) -> anyhow::Result<()> {
    let installer = Installer::new(&cfg.install_root);
    let message = installer.delete(filename)?;
    println!("{message}");
    Ok(())
}

async fn run_url(cfg: &Config, id: &str) -> anyhow::Result<()> {
    let api = RepoApi::new(cfg);
    match api.resolve_download_url(id).await {
        Some(url) => {
            println!("{url}");
            Ok(())
        }
        None => anyhow::bail!("could not resolve a download URL for {id}"),
    }
}

fn run_set_path(dir: PathBuf) -> anyhow::Result<()> {
    let file = ConfigFile {
        install_path: dir.display().to_string(),
    };
    file.save()?;
    println!("install path set to {} ({})", dir.display(), ConfigFile::path().display());
    Ok(())
}
