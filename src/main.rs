/*!
 * Patchbay CLI - Command Line Interface
 *
 * Version: 0.3.0
 */

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use patchbay::{
    cli_progress::{format_bytes, CliProgressRenderer},
    config::{BatchDefaults, PatchConfig},
    error::{PatchError, EXIT_FATAL, EXIT_SUCCESS},
    logging, AssetInfo, BatchOperation, BatchProgress, BundleInfo, DownloadSelection, Manifest,
    PatchService, ProgressPublisher, UnpackSelection,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How often the CLI polls a running batch
const TICK: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "patchbay")]
#[command(version, about = "Download and unpack content bundles from a patch manifest", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// JSON manifest (overrides manifest_path from the config)
    #[arg(short = 'm', long, value_name = "FILE", global = true)]
    manifest: Option<PathBuf>,

    /// Primary host root, e.g. https://cdn.example.com/game/v12
    #[arg(long, value_name = "URL", global = true)]
    host: Option<String>,

    /// Fallback host root (defaults to the primary host)
    #[arg(long, value_name = "URL", global = true)]
    fallback_host: Option<String>,

    /// Local cache directory
    #[arg(long, value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Directory holding the bundles shipped with the client
    #[arg(long, value_name = "DIR", global = true)]
    buildin_dir: Option<PathBuf>,

    /// Verbose output (debug logging, per-bundle events)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download missing bundles
    Download(DownloadArgs),

    /// Copy build-in bundles into the cache
    Unpack(UnpackArgs),

    /// Print the download work list without transferring anything
    Plan(SelectionArgs),

    /// Show where an asset's bundle and its dependencies load from
    Resolve {
        /// Asset path as listed in the manifest
        asset: String,
    },
}

#[derive(Args)]
struct SelectionArgs {
    /// Only bundles with this tag (repeatable); untagged bundles always qualify
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    /// Bundles needed by this asset path, with dependencies (repeatable)
    #[arg(long = "asset", value_name = "PATH", conflicts_with = "tags")]
    assets: Vec<String>,
}

impl SelectionArgs {
    fn to_selection(&self) -> DownloadSelection {
        if !self.assets.is_empty() {
            DownloadSelection::Assets(self.assets.iter().map(AssetInfo::new).collect())
        } else if !self.tags.is_empty() {
            DownloadSelection::Tags(self.tags.clone())
        } else {
            DownloadSelection::All
        }
    }
}

#[derive(Args)]
struct BatchArgs {
    /// Maximum concurrent transfers
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Retries per bundle
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Seconds without progress before a transfer times out
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

impl BatchArgs {
    fn apply(&self, defaults: &BatchDefaults) -> BatchDefaults {
        let mut merged = defaults.clone();
        if let Some(n) = self.concurrency {
            merged.concurrency_limit = n;
        }
        if let Some(n) = self.retries {
            merged.retry_budget = n;
        }
        if let Some(secs) = self.timeout {
            merged.timeout_secs = secs;
        }
        merged
    }
}

#[derive(Args)]
struct DownloadArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    #[command(flatten)]
    batch: BatchArgs,
}

#[derive(Args)]
struct UnpackArgs {
    /// Only build-in bundles carrying this tag (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    tags: Vec<String>,

    #[command(flatten)]
    batch: BatchArgs,
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<PatchError>()
                .map(PatchError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
    config.validate()?;

    let manifest_path = config
        .manifest_path
        .clone()
        .ok_or_else(|| PatchError::Config("no manifest given (--manifest or manifest_path)".into()))?;
    let manifest = Manifest::from_file(&manifest_path)
        .map_err(PatchError::from)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?
        .with_location_to_lower(config.location_to_lower);
    info!(
        "Loaded manifest {} {} ({} bundles)",
        manifest.package_name,
        manifest.package_version,
        manifest.bundles().len()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| PatchError::Runtime(e.to_string()))?;

    runtime.block_on(execute(cli.command, config, Arc::new(manifest)))?;
    Ok(())
}

/// Config file (if any) with command-line overrides applied
fn load_config(cli: &Cli) -> anyhow::Result<PatchConfig> {
    let mut config = match &cli.config {
        Some(path) => PatchConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PatchConfig::default(),
    };

    if let Some(path) = &cli.manifest {
        config.manifest_path = Some(path.clone());
    }
    if let Some(host) = &cli.host {
        config.default_host = host.trim_end_matches('/').to_string();
    }
    if let Some(host) = &cli.fallback_host {
        config.fallback_host = Some(host.trim_end_matches('/').to_string());
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(dir) = &cli.buildin_dir {
        config.buildin_dir = dir.clone();
    }
    if let Some(path) = &cli.log_file {
        config.log_file = Some(path.clone());
    }
    config.verbose |= cli.verbose;
    Ok(config)
}

async fn execute(
    command: Commands,
    config: PatchConfig,
    manifest: Arc<Manifest>,
) -> patchbay::Result<()> {
    let service = PatchService::from_config(&config, manifest)?;

    match command {
        Commands::Resolve { asset } => {
            let asset = AssetInfo::new(asset);
            let main = service.resolve_bundle(&asset)?;
            println!("{}", asset.path);
            print_bundle(&main);
            for dep in service.resolve_dependencies(&asset)? {
                print_bundle(&dep);
            }
            Ok(())
        }

        Commands::Plan(selection) => {
            let items = service.plan_download(&selection.to_selection())?;
            for item in &items {
                print_bundle(item);
            }
            let total: u64 = items.iter().map(BundleInfo::size).sum();
            println!("{} bundles, {}", items.len(), format_bytes(total));
            Ok(())
        }

        Commands::Download(args) => {
            let options = args.batch.apply(&config.download).to_options();
            let (publisher, subscriber) = ProgressPublisher::unbounded();
            let service = service.with_publisher(publisher);
            let batch = service.create_downloader(args.selection.to_selection(), options)?;
            let renderer = CliProgressRenderer::new(
                subscriber,
                batch.kind(),
                batch.progress().total_bytes,
                config.verbose,
            );
            drive(batch, renderer).await
        }

        Commands::Unpack(args) => {
            let options = args.batch.apply(&config.unpack).to_options();
            let selection = if args.tags.is_empty() {
                UnpackSelection::All
            } else {
                UnpackSelection::Tags(args.tags)
            };
            let (publisher, subscriber) = ProgressPublisher::unbounded();
            let service = service.with_publisher(publisher);
            let batch = service.create_unpacker(selection, options)?;
            let renderer = CliProgressRenderer::new(
                subscriber,
                batch.kind(),
                batch.progress().total_bytes,
                config.verbose,
            );
            drive(batch, renderer).await
        }
    }
}

/// Poll `batch` until done; Ctrl-C aborts it
async fn drive(mut batch: BatchOperation, renderer: CliProgressRenderer) -> patchbay::Result<()> {
    let mut ticker = tokio::time::interval(TICK);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let progress: BatchProgress = loop {
        tokio::select! {
            _ = ticker.tick() => {
                let progress = batch.poll();
                renderer.update(&progress);
                if progress.is_done {
                    break progress;
                }
            }
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                warn!("Interrupted, aborting {} batch", batch.kind());
                batch.abort();
            }
        }
    };
    renderer.finish(&progress);

    if !progress.is_succeeded {
        let residual = batch.residual();
        if !residual.is_empty() {
            warn!(
                "{} bundles not completed; rerun the same command to resume",
                residual.len()
            );
        }
    }
    batch.result()
}

fn print_bundle(info: &BundleInfo) {
    let url = if info.main_url.is_empty() {
        "-"
    } else {
        info.main_url.as_str()
    };
    println!(
        "  {:<32} {:<9} {:>12}  {}",
        info.name(),
        info.load_mode.to_string(),
        format_bytes(info.size()),
        url
    );
}
