//! # Video Shrinker - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (sempre su stderr)
//! - Caricamento della configurazione da file e override da CLI
//! - Richiesta interattiva delle directory mancanti e conferma dell'utente
//! - Avvio del compressore e traduzione del report in exit code
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO, DEBUG con --verbose, WARN con --json)
//! 3. Carica la configurazione e applica gli override
//! 4. Verifica ffmpeg/ffprobe e le directory
//! 5. Chiede conferma (salvo --yes, --json o --dry-run)
//! 6. Esegue il run ed esce con il codice del report
//!
//! ## Esempio di utilizzo:
//! ```bash
//! video-shrinker -s ~/Videos -b ~/Videos-originals --target-mb 25 --yes
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use video_shrinker::compressor::report::{EXIT_FATAL, EXIT_SUCCESS};
use video_shrinker::compressor::BackupResolver;
use video_shrinker::file_manager::FileManager;
use video_shrinker::json_output::JsonMessage;
use video_shrinker::platform::PlatformCommands;
use video_shrinker::{BatchCompressor, Config, EncoderBackend, ShrinkError};

#[derive(Parser)]
#[command(name = "video-shrinker")]
#[command(about = "Shrink videos to a target size, keeping the originals in a mirrored backup tree")]
struct Args {
    /// Directory tree containing the videos to shrink
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Directory receiving the originals (must not be inside the source)
    #[arg(short, long)]
    backup: Option<PathBuf>,

    /// Maximum size per file in MB
    #[arg(long)]
    target_mb: Option<u64>,

    /// Fraction of the maximum size to aim for (0.0-1.0)
    #[arg(long)]
    safety_factor: Option<f64>,

    /// Minimum video bitrate in kbps
    #[arg(long)]
    min_video_kbps: Option<u64>,

    /// Audio bitrate in kbps
    #[arg(long)]
    audio_kbps: Option<u64>,

    /// Video extension to scan for (repeatable, replaces the defaults)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Encoder backend to try, in order (repeatable; default: detect)
    #[arg(long = "backend", value_name = "BACKEND")]
    backends: Vec<EncoderBackend>,

    /// Fail files whose size budget cannot be met instead of encoding at the minimum bitrate
    #[arg(long)]
    strict: bool,

    /// Dry run - probe and plan only, don't touch any file
    #[arg(long)]
    dry_run: bool,

    /// Output progress and results as JSON
    #[arg(long)]
    json: bool,

    /// Don't ask for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Per-attempt encode timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Configuration file (default: <config dir>/video-shrinker/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let json = args.json;

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(EXIT_FATAL);
    }

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let kind = e
                .downcast_ref::<ShrinkError>()
                .map(|err| err.kind())
                .unwrap_or("fatal-error");
            if json {
                JsonMessage::error(kind, format!("{:#}", e)).emit();
            } else {
                eprintln!("Error: {:#}", e);
            }
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let default_level = if args.json {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(args: Args) -> Result<i32> {
    debug!("System: {}", PlatformCommands::system_info());

    let mut config = load_config(args.config.as_ref()).await?;
    apply_overrides(&mut config, &args);

    if config.source_dir.as_os_str().is_empty() {
        config.source_dir = PathBuf::from(prompt("Source directory: ").await?);
    }
    if config.backup_dir.as_os_str().is_empty() {
        config.backup_dir = PathBuf::from(prompt("Backup directory: ").await?);
    }

    let compressor = BatchCompressor::with_system_tools(config).await?;
    let resolver = BackupResolver::new(&compressor.config().source_dir, &compressor.config().backup_dir)?;

    let config = compressor.config();
    if !(args.yes || config.json_output || config.dry_run) {
        let budget = config.size_budget();
        let question = format!(
            "Videos over {} in {} will be re-encoded in place; originals go to {}. Continue? [y/N] ",
            FileManager::format_size(budget.max_bytes),
            resolver.source_root().display(),
            resolver.backup_root().display()
        );
        let answer = prompt(&question).await?;
        if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
            info!("Aborted by user, nothing was changed");
            return Ok(EXIT_SUCCESS);
        }
    }

    let report = compressor.run().await?;
    Ok(report.exit_code())
}

/// Load the configuration file; an explicitly named file must exist
async fn load_config(explicit: Option<&PathBuf>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ShrinkError::Config(format!(
                    "config file not found: {}",
                    path.display()
                ))
                .into());
            }
            path.clone()
        }
        None => match Config::default_path() {
            Some(path) => path,
            None => return Ok(Config::default()),
        },
    };

    debug!("Loading configuration from {}", path.display());
    Config::from_file(&path)
        .await
        .map_err(|e| ShrinkError::Config(format!("{:#}", e)).into())
}

/// Command-line values win over the configuration file
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(source) = &args.source {
        config.source_dir = source.clone();
    }
    if let Some(backup) = &args.backup {
        config.backup_dir = backup.clone();
    }
    if let Some(target_mb) = args.target_mb {
        config.max_size_mb = target_mb;
    }
    if let Some(safety_factor) = args.safety_factor {
        config.safety_factor = safety_factor;
    }
    if let Some(kbps) = args.min_video_kbps {
        config.min_video_bitrate_kbps = kbps;
    }
    if let Some(kbps) = args.audio_kbps {
        config.audio_bitrate_kbps = kbps;
    }
    if !args.extensions.is_empty() {
        config.extensions = args.extensions.clone();
    }
    if !args.backends.is_empty() {
        config.backends = args.backends.clone();
    }
    if args.timeout.is_some() {
        config.encode_timeout_secs = args.timeout;
    }
    config.strict |= args.strict;
    config.dry_run |= args.dry_run;
    config.json_output |= args.json;
}

/// Ask on stderr, read one trimmed line from stdin
async fn prompt(question: &str) -> Result<String> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(question.as_bytes()).await?;
    stderr.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}
