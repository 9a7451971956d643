//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use thyself_core::{
    BackendClient, BridgeRelay, DirectTransport, FeedSignal, HarvestPipeline, HarvestStats,
    OriginPolicy, RelayTransport, Router, TransportSelector, sync_once,
};
use thyself_shared::{
    AppConfig, ArchivePiece, HarvestConfig, SyncStatus, TitleBatchEntry, init_config, load_config,
    resolve_db_path, validate_backend_url,
};
use thyself_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Thyself — see what your feeds say about you.
#[derive(Parser)]
#[command(
    name = "thyself",
    version,
    about = "Harvest feed titles locally and sync topic profiles with the analysis backend.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `storage.db_path`).
    #[arg(long, global = true, env = "THYSELF_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Replay saved page snapshots through the harvester.
    Harvest {
        /// HTML snapshot files; each one is its own navigation session.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Page URL the snapshots were taken from.
        #[arg(long, default_value = "https://www.youtube.com/")]
        page_url: String,
    },

    /// Show titles waiting for analysis.
    Titles {
        /// Print raw JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show the recommendation archive.
    Archive,

    /// Show sync status and store sizes.
    Status,

    /// Send one protocol request and print the response.
    Send {
        /// Action name, e.g. GET_TITLES.
        action: String,

        /// JSON payload.
        payload: Option<String>,
    },

    /// Run the bridge relay over stdin/stdout (JSON lines).
    Serve,

    /// Run one orchestrator pass against the analysis backend.
    Sync {
        /// User id sent to the backend (overrides `backend.user_id`).
        #[arg(long)]
        user_id: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so `serve` keeps
/// stdout for the relay.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "thyself=info",
        1 => "thyself=debug",
        _ => "thyself=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        Command::Harvest { files, page_url } => cmd_harvest(db, &files, &page_url).await,
        Command::Titles { json } => cmd_titles(db, json).await,
        Command::Archive => cmd_archive(db).await,
        Command::Status => cmd_status(db).await,
        Command::Send { action, payload } => cmd_send(db, &action, payload.as_deref()).await,
        Command::Serve => cmd_serve(db).await,
        Command::Sync { user_id } => cmd_sync(db, user_id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Loaded config plus a router over the resolved database.
struct Context {
    config: AppConfig,
    router: Router,
}

impl Context {
    async fn open(db: Option<PathBuf>) -> Result<Self> {
        let config = load_config()?;
        let path = match db {
            Some(path) => path,
            None => resolve_db_path(&config)?,
        };
        info!(db = %path.display(), "opening store");
        let storage = Arc::new(Storage::open(&path).await?);
        let router = Router::new(storage, &config.retention);
        Ok(Self { config, router })
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, action: &str) -> Result<T> {
        Ok(self.router.handle(action, Value::Null).await.into_data()?)
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_harvest(db: Option<PathBuf>, files: &[PathBuf], page_url: &str) -> Result<()> {
    let ctx = Context::open(db).await?;
    let pipeline = HarvestPipeline::new(ctx.router.clone(), HarvestConfig::from(&ctx.config));
    let (signals, handle) = pipeline.spawn();

    for file in files {
        let html = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;
        info!(file = %file.display(), bytes = html.len(), "replaying snapshot");
        for signal in [
            FeedSignal::Navigate {
                url: page_url.to_string(),
            },
            FeedSignal::Mutation { html },
            FeedSignal::Sweep,
        ] {
            signals
                .send(signal)
                .await
                .map_err(|_| eyre!("harvest pipeline stopped early"))?;
        }
    }
    drop(signals);

    let HarvestStats {
        emitted,
        accepted,
        rejected,
        deferred,
        retried,
    } = handle.await?;
    let waiting: Vec<TitleBatchEntry> = ctx.request("GET_TITLES").await?;

    println!();
    println!("  Snapshots: {}", files.len());
    println!("  Emitted:   {emitted} ({accepted} accepted, {rejected} rejected)");
    println!("  Deferred:  {deferred} ({retried} retried)");
    println!("  Waiting:   {} titles", waiting.len());
    println!();
    Ok(())
}

async fn cmd_titles(db: Option<PathBuf>, json: bool) -> Result<()> {
    let ctx = Context::open(db).await?;
    let titles: Vec<TitleBatchEntry> = ctx.request("GET_TITLES").await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&titles)?);
        return Ok(());
    }
    if titles.is_empty() {
        println!("No titles waiting.");
        return Ok(());
    }
    for entry in &titles {
        let length = entry.length.as_deref().unwrap_or("-");
        println!(
            "{}  {:>8}  {}",
            entry.ts.format("%Y-%m-%d %H:%M"),
            length,
            entry.title
        );
    }
    println!("\n{} titles", titles.len());
    Ok(())
}

async fn cmd_archive(db: Option<PathBuf>) -> Result<()> {
    let ctx = Context::open(db).await?;
    let pieces: Vec<ArchivePiece> = ctx.request("GET_ARCHIVE").await?;

    if pieces.is_empty() {
        println!("Archive is empty.");
        return Ok(());
    }
    for piece in &pieces {
        println!("{}  {} ({})", piece.date, piece.title, piece.source);
        println!("            {}", piece.url);
    }
    Ok(())
}

async fn cmd_status(db: Option<PathBuf>) -> Result<()> {
    let ctx = Context::open(db).await?;
    let status: SyncStatus = ctx.request("GET_STATUS").await?;
    let titles: Vec<TitleBatchEntry> = ctx.request("GET_TITLES").await?;
    let pieces: Vec<ArchivePiece> = ctx.request("GET_ARCHIVE").await?;

    let last_sync = status
        .last_sync_at
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "never".into());
    println!("  Last sync: {last_sync}");
    println!("  Titles:    {}", titles.len());
    println!("  Archive:   {}/{}", pieces.len(), ctx.config.retention.archive_cap);
    Ok(())
}

async fn cmd_send(db: Option<PathBuf>, action: &str, payload: Option<&str>) -> Result<()> {
    let ctx = Context::open(db).await?;
    let payload: Value = match payload {
        Some(raw) => serde_json::from_str(raw).map_err(|e| eyre!("invalid payload JSON: {e}"))?,
        None => Value::Null,
    };

    let response = ctx.router.handle(action, payload).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    match response.error {
        Some(error) if !response.ok => Err(eyre!("{action} failed: {error}")),
        _ => Ok(()),
    }
}

async fn cmd_serve(db: Option<PathBuf>) -> Result<()> {
    let ctx = Context::open(db).await?;
    let policy = OriginPolicy::new(&ctx.config.bridge.allowed_origins)?;
    let relay = BridgeRelay::new(ctx.router, policy);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    relay.serve(stdin, tokio::io::stdout()).await?;
    Ok(())
}

async fn cmd_sync(db: Option<PathBuf>, user_id: Option<String>) -> Result<()> {
    let ctx = Context::open(db).await?;
    let base = validate_backend_url(&ctx.config)?;
    let client = BackendClient::new(&base, Duration::from_secs(ctx.config.backend.timeout_secs))?;
    let user_id = user_id.unwrap_or_else(|| ctx.config.backend.user_id.clone());

    let bridge = &ctx.config.bridge;
    let origin = bridge
        .allowed_origins
        .first()
        .ok_or_else(|| eyre!("bridge.allowed_origins is empty"))?;
    let relay = RelayTransport::connect(
        BridgeRelay::new(ctx.router.clone(), OriginPolicy::new(&bridge.allowed_origins)?),
        origin.clone(),
    );
    let direct = DirectTransport::new(ctx.router.clone(), bridge.endpoint_id.clone());
    let transport = TransportSelector::new(
        relay,
        direct,
        Duration::from_millis(bridge.relay_timeout_ms),
    );

    let spinner = spinner(format!("Syncing with {base}"));
    let healthy = client.health().await;
    if !matches!(healthy, Ok(true)) {
        spinner.finish_and_clear();
        let reason = match healthy {
            Ok(_) => "reported not ok".to_string(),
            Err(e) => e.to_string(),
        };
        return Err(eyre!("backend at {base} is unavailable: {reason}"));
    }
    let report = sync_once(&transport, &client, &user_id).await;
    spinner.finish_and_clear();
    let report = report?;

    println!();
    if report.analyzed == 0 {
        println!("  Nothing to sync: no titles waiting.");
    } else {
        println!("  Analyzed:     {} titles", report.analyzed);
        println!("  Acknowledged: {}", report.acknowledged);
        match &report.piece {
            Some(piece) => {
                println!("  Tags:         {}", report.tags.join(", "));
                println!("  Recommended:  {} ({})", piece.title, piece.source);
            }
            None => println!("  Recommended:  - (profile too thin)"),
        }
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    spinner.set_style(style);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
