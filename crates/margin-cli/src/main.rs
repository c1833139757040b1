//! Margin CLI
//!
//! Command-line interface for scanning a workspace's inline annotations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use margin_core::{Config, IndexService};
use margin_indexer::{Annotation, ScanState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "margin")]
#[command(about = "Margin - inline annotation discovery for your workspace")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a workspace and list its annotations
    Scan {
        /// Workspace root (default: current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Override the marker pattern, e.g. "TODO|FIXME"
        #[arg(long)]
        pattern: Option<String>,

        /// Restrict the scan to these include globs
        #[arg(long)]
        include: Vec<String>,

        /// Additional exclude globs
        #[arg(long)]
        exclude: Vec<String>,

        /// Print annotations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan, then watch the workspace and report index repairs
    Watch {
        /// Workspace root (default: current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Override the marker pattern, e.g. "TODO|FIXME"
        #[arg(long)]
        pattern: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Simple logging for CLI
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            pattern,
            include,
            exclude,
            json,
        } => cmd_scan(&path, pattern, include, exclude, json).await,
        Commands::Watch { path, pattern } => cmd_watch(&path, pattern).await,
    }
}

fn build_config(pattern: Option<String>, include: Vec<String>, exclude: Vec<String>) -> Config {
    let mut config = Config::load();
    if let Some(pattern) = pattern {
        config.marker_pattern = pattern;
    }
    if !include.is_empty() {
        config.include_globs = include;
    }
    config.exclude_globs.extend(exclude);
    config
}

/// Run the initial scan and collect every annotation, paging through the
/// background batches as they land.
async fn collect_all(service: &IndexService) -> Result<Vec<Arc<Annotation>>> {
    let mut status_rx = service.subscribe_status();
    let mut all = service.initialize_scan().await.context("Scan failed")?;

    while service.is_scan_in_progress() {
        match status_rx.recv().await {
            Ok(status) if status.state != ScanState::Searching => break,
            Ok(_) => {
                let page = service.next_batch(all.len());
                all.extend(page);
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }

    // Drain whatever landed after the last status update
    loop {
        let page = service.next_batch(all.len());
        if page.is_empty() {
            break;
        }
        all.extend(page);
    }

    Ok(all)
}

async fn cmd_scan(
    path: &str,
    pattern: Option<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    json: bool,
) -> Result<()> {
    let root = PathBuf::from(path).canonicalize().context("Invalid path")?;
    let config = build_config(pattern, include, exclude);

    let service = IndexService::open(config, &root).context("Failed to open workspace")?;
    let all = collect_all(&service).await?;

    if json {
        let values: Vec<&Annotation> = all.iter().map(|a| a.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    print_grouped(&root, &all);

    let files: HashSet<&Path> = all.iter().map(|a| a.file.as_path()).collect();
    println!("✓ {} annotations in {} files", all.len(), files.len());

    Ok(())
}

async fn cmd_watch(path: &str, pattern: Option<String>) -> Result<()> {
    let root = PathBuf::from(path).canonicalize().context("Invalid path")?;
    let config = build_config(pattern, Vec::new(), Vec::new());

    let service = IndexService::open(config, &root).context("Failed to open workspace")?;
    let all = collect_all(&service).await?;

    print_grouped(&root, &all);
    println!("✓ {} annotations", all.len());

    service.watch(&root).context("Failed to start watching")?;
    println!("Watching {} for changes. Press Ctrl+C to stop.", root.display());

    let mut status_rx = service.subscribe_status();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            result = status_rx.recv() => match result {
                Ok(status) if status.state == ScanState::Complete => {
                    println!("✓ Index repaired: {} annotations", service.total_count());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
    }

    service.shutdown();
    println!("Stopped.");

    Ok(())
}

fn print_grouped(root: &Path, annotations: &[Arc<Annotation>]) {
    let mut current_file: Option<&Path> = None;

    for annotation in annotations {
        if current_file != Some(annotation.file.as_path()) {
            if current_file.is_some() {
                println!();
            }
            let relative = annotation
                .file
                .strip_prefix(root)
                .unwrap_or(&annotation.file);
            println!("{}", relative.display());
            current_file = Some(annotation.file.as_path());
        }

        let position = format!("{}:{}", annotation.line + 1, annotation.column + 1);
        match &annotation.author {
            Some(author) => println!(
                "  {position}  [{}] {} ({author})",
                annotation.kind, annotation.message
            ),
            None => println!("  {position}  [{}] {}", annotation.kind, annotation.message),
        }
    }

    if !annotations.is_empty() {
        println!();
    }
}
