use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use media_triage_core::{
    app_paths, find_leaf_folders, load_config, run_scan, save_config, CancelFlag,
    MediaMetadataProvider, RuleSet, ScanOptions, ScanRun, TriageConfig, TriageError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LARGE_DOCUMENT_MIN_BYTES_ARG: &str = "524288";

#[derive(Debug, Parser)]
#[command(name = "media-triage")]
#[command(about = "Finds junk photos and duplicate tracks and moves them to a quarantine folder")]
struct Cli {
    /// Log at debug level unless MEDIA_TRIAGE_LOG says otherwise.
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Scan(ScanArgs),
    Leaves(LeavesArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    folder: PathBuf,
    #[arg(long)]
    max_size: Option<u64>,
    #[arg(long)]
    destination: Option<PathBuf>,
    #[arg(long = "keyword")]
    keywords: Vec<String>,
    #[arg(long)]
    duplicate_suffix_max: Option<u32>,
    #[arg(long, default_value_t = false)]
    require_camera_metadata: bool,
    /// Also quarantine documents of at least this many bytes (512 KiB when given without a value).
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_LARGE_DOCUMENT_MIN_BYTES_ARG)]
    large_documents: Option<u64>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    #[arg(long)]
    ledger: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(Debug, Args)]
struct LeavesArgs {
    folder: PathBuf,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Init,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Scan(args) => cmd_scan(args),
        Commands::Leaves(args) => cmd_leaves(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init => cmd_config_init(),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<TriageError>()
                .map(TriageError::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("MEDIA_TRIAGE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn install_cancel_handler() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        warn!("interrupt received, stopping after the current folder");
        flag.cancel();
    }) {
        warn!("could not install Ctrl+C handler: {err}");
    }
    cancel
}

fn effective_config(args: &ScanArgs) -> Result<TriageConfig> {
    let mut config = load_config()?;
    if let Some(max_size) = args.max_size {
        config.max_size_bytes = max_size;
    }
    if !args.keywords.is_empty() {
        config.keywords = args.keywords.clone();
    }
    if let Some(max) = args.duplicate_suffix_max {
        config.duplicate_suffix_max = max;
    }
    if args.require_camera_metadata {
        config.require_camera_metadata = true;
    }
    if let Some(min_bytes) = args.large_documents {
        config.large_document_min_bytes = Some(min_bytes);
    }
    Ok(config)
}

fn cmd_scan(args: ScanArgs) -> Result<()> {
    let config = effective_config(&args)?;
    let mut options = ScanOptions::new(&args.folder, RuleSet::from_config(&config));
    options.destination = args.destination.clone();
    options.dry_run = args.dry_run;
    options.cancel = install_cancel_handler();
    options.ledger_path = Some(
        args.ledger
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.ledger_file_name)),
    );

    info!(folder = %args.folder.display(), "scanning");
    let run = run_scan(&options, &MediaMetadataProvider::new())?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", run.ledger.serialize()?);
            eprintln!("{}", summary_line(&run));
        }
        OutputFormat::Table => print_table(&run),
    }

    if args.dry_run && args.destination.is_some() {
        eprintln!("dry run: nothing was moved. Drop --dry-run to relocate.");
    }
    Ok(())
}

fn cmd_leaves(args: LeavesArgs) -> Result<()> {
    let leaves = find_leaf_folders(&args.folder, &install_cancel_handler())?;
    let paths: Vec<String> = leaves
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();
    let body = serde_json::to_string_pretty(&paths)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, body)?;
            info!(count = leaves.len(), output = %path.display(), "leaf folders written");
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("config file: {}", paths.config_path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() {
        anyhow::bail!("config file already exists: {}", paths.config_path.display());
    }
    save_config(&TriageConfig::default())?;
    println!("wrote {}", paths.config_path.display());
    Ok(())
}

fn print_table(run: &ScanRun) {
    println!("file -> destination (reason, outcome)");
    for entry in run.ledger.entries() {
        let destination = entry
            .destination
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} -> {} ({}, {:?})",
            entry.record.path.display(),
            destination,
            entry.record.match_reason,
            entry.outcome
        );
    }
    if run.ledger.is_empty() {
        println!("no matches");
    }
    println!("\n{}", summary_line(run));
}

fn summary_line(run: &ScanRun) -> String {
    let s = &run.summary;
    format!(
        "summary: scanned={} matched={} relocated={} failed={} skipped_subtrees={} unreadable={} metadata_failures={}",
        s.scanned,
        s.matched,
        s.relocated,
        s.failed,
        s.skipped_subtrees,
        s.unreadable_files,
        s.metadata_failures
    )
}
