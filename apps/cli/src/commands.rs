//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use contentbridge_assets::{QUEUE_JOB, QueueProcessor};
use contentbridge_core::{
    Exporter, ImportOutput, ImportRequest, Importer, ProgressReporter,
};
use contentbridge_shared::{
    AppConfig, AssetConfig, AssetReference, AssetState, ImageProcessing, ImportConfig, RecordId,
    RenderTarget, init_config, load_config, load_config_from, state_dir,
};
use contentbridge_storage::{Host, MemoryHost, Scheduler, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ContentBridge: move rich content between an external editor and a host store.
#[derive(Parser)]
#[command(
    name = "contentbridge",
    version,
    about = "Import HTML fragments as flat HTML or block-tree documents, and export them back.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.contentbridge/contentbridge.toml).
    #[arg(long, global = true, env = "CONTENTBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Image processing override.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ImagesArg {
    Auto,
    Sync,
    Async,
}

impl From<ImagesArg> for ImageProcessing {
    fn from(arg: ImagesArg) -> Self {
        match arg {
            ImagesArg::Auto => Self::Auto,
            ImagesArg::Sync => Self::Sync,
            ImagesArg::Async => Self::Async,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import an HTML fragment and store it as a new record.
    Import {
        /// Input file, or `-` for stdin.
        input: String,

        /// Output format: flat or block-tree.
        #[arg(short, long)]
        target: Option<RenderTarget>,

        /// Record title (defaults to the first <h1>).
        #[arg(long)]
        title: Option<String>,

        /// SEO meta title.
        #[arg(long)]
        meta_title: Option<String>,

        /// SEO meta description.
        #[arg(long)]
        meta_description: Option<String>,

        /// Image processing mode.
        #[arg(long)]
        images: Option<ImagesArg>,

        /// Record id of a block-tree document to borrow styling from.
        #[arg(long)]
        template: Option<RecordId>,

        /// Canonical site origin for link classification.
        #[arg(long)]
        origin: Option<String>,

        /// Transform in memory only; print the result and store nothing.
        #[arg(long)]
        dry_run: bool,

        /// Write the rendered output to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Flatten a stored record (or an HTML file) for the external service.
    Export {
        /// Record id to export.
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        id: Option<RecordId>,

        /// Flatten a local HTML file instead of a stored record.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Run the background image queue.
    ProcessQueue {
        /// Run even if no run is due yet.
        #[arg(long)]
        force: bool,

        /// Keep running batches until the queue is empty.
        #[arg(long)]
        all: bool,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contentbridge=info",
        1 => "contentbridge=debug",
        _ => "contentbridge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Import {
            input,
            target,
            title,
            meta_title,
            meta_description,
            images,
            template,
            origin,
            dry_run,
            out,
        } => {
            let mut import_config = ImportConfig::from(&config);
            if let Some(target) = target {
                import_config.target = target;
            }
            if template.is_some() {
                import_config.style_template_id = template;
            }
            if let Some(origin) = origin {
                import_config.canonical_origin = origin;
            }
            let mut asset_config = AssetConfig::from(&config);
            if let Some(images) = images {
                asset_config.processing = images.into();
            }

            let request = ImportRequest {
                html: read_input(&input)?,
                title,
                meta_title,
                meta_description,
            };

            let args = ImportArgs {
                request,
                import_config,
                asset_config,
                out,
            };
            if dry_run {
                let host = MemoryHost::new().with_media_base_url(&config.storage.media_base_url);
                cmd_import(&host, args, false).await
            } else {
                let storage = open_storage(&config).await?;
                cmd_import(&storage, args, true).await
            }
        }
        Command::Export { id, file } => match (id, file) {
            (_, Some(path)) => cmd_export_file(&path),
            (Some(id), None) => cmd_export_record(&config, id).await,
            (None, None) => Err(eyre!("either a record id or --file is required")),
        },
        Command::ProcessQueue { force, all } => cmd_process_queue(&config, force, all).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let dir = state_dir(config)?;
    let storage = Storage::open_in(&dir)
        .await?
        .with_media_base_url(&config.storage.media_base_url);
    Ok(storage)
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).map_err(|e| eyre!("cannot read '{input}': {e}"))
}

fn write_output(out: Option<&Path>, content: &str) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, content)
                .map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
            println!("Output written to {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

struct ImportArgs {
    request: ImportRequest,
    import_config: ImportConfig,
    asset_config: AssetConfig,
    out: Option<PathBuf>,
}

async fn cmd_import<H: Host>(host: &H, args: ImportArgs, store: bool) -> Result<()> {
    info!(
        render_target = ?args.import_config.target,
        images = ?args.asset_config.processing,
        store,
        "importing content"
    );

    let importer = Importer::new(host, args.import_config, args.asset_config)?;
    let reporter = CliProgress::new();

    let (record_id, output) = if store {
        let (id, output) = importer.import_and_store(&args.request, &reporter).await?;
        (Some(id), output)
    } else {
        (None, importer.import(&args.request, &reporter).await?)
    };

    write_output(args.out.as_deref(), output.content())?;
    print_summary(record_id, &output);
    Ok(())
}

fn print_summary(record_id: Option<RecordId>, output: &ImportOutput) {
    let count = |state: AssetState| output.images.iter().filter(|r| r.state == state).count();

    eprintln!();
    match record_id {
        Some(id) => eprintln!("  Record {id} created"),
        None => eprintln!("  Dry run: nothing stored"),
    }
    eprintln!("  Title:    {}", output.title);
    eprintln!("  Mode:     {}", output.mode);
    eprintln!(
        "  Images:   {} resolved, {} queued, {} failed",
        count(AssetState::Resolved),
        count(AssetState::Queued),
        count(AssetState::Failed)
    );
    eprintln!();
}

fn cmd_export_file(path: &Path) -> Result<()> {
    let html = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
    let host = MemoryHost::new();
    println!("{}", Exporter::new(&host).export_html(&html));
    Ok(())
}

async fn cmd_export_record(config: &AppConfig, id: RecordId) -> Result<()> {
    let storage = open_storage(config).await?;
    let exported = Exporter::new(&storage).export_record(id).await?;
    eprintln!("  Exported record {} ({})", exported.id, exported.title);
    println!("{}", exported.html);
    Ok(())
}

async fn cmd_process_queue(config: &AppConfig, force: bool, all: bool) -> Result<()> {
    let storage = open_storage(config).await?;

    if !force {
        match storage.scheduled_at(QUEUE_JOB).await? {
            None => {
                println!("No queue run is scheduled.");
                return Ok(());
            }
            Some(due) if due > chrono::Utc::now() => {
                println!("Next queue run is due at {due}; use --force to run now.");
                return Ok(());
            }
            Some(_) => {}
        }
    }

    let asset_config = AssetConfig::from(config);
    let delay = asset_config.reschedule_delay;
    let processor = QueueProcessor::new(&storage, asset_config)?;

    loop {
        let report = processor.process_queue().await?;
        println!(
            "  Batch: {} attempted, {} resolved, {} failed, {} records updated, {} remaining",
            report.attempted,
            report.resolved,
            report.failed,
            report.records_updated,
            report.remaining
        );
        if !all || report.remaining == 0 {
            break;
        }
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn image_resolved(&self, reference: &AssetReference, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Images [{current}/{total}] {}",
            reference.origin_url
        ));
    }

    fn done(&self, _output: &ImportOutput) {
        self.spinner.finish_and_clear();
    }
}
