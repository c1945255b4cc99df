//! # Video Shrinker Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom con classificazione fatale/per-file
//! - `bitrate`: Calcolo del bitrate video dal budget di dimensione
//! - `prober`: Lettura della durata tramite ffprobe
//! - `encoder`: Backend di encoding con fallback hardware → software
//! - `file_manager`: Discovery video e operazioni sui file
//! - `compressor`: Orchestratore del run (backup, sostituzione, interruzione)
//! - `platform` / `tool_resolver`: Ricerca ffmpeg/ffprobe e rilevamento hardware
//! - `progress` / `json_output`: Progress bar, statistiche ed eventi JSON
//!
//! ## Utilizzo:
//! ```ignore
//! use video_shrinker::{BatchCompressor, Config};
//!
//! let config = Config {
//!     source_dir: "videos".into(),
//!     backup_dir: "originals".into(),
//!     ..Default::default()
//! };
//! let compressor = BatchCompressor::with_system_tools(config).await?;
//! let report = compressor.run().await?;
//! std::process::exit(report.exit_code());
//! ```

pub mod bitrate;
pub mod compressor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod platform;
pub mod prober;
pub mod progress;
pub mod tool_resolver;
pub mod utils;

pub use bitrate::{BitratePlan, SizeBudget};
pub use compressor::{BatchCompressor, FileReport, OutputMode, ProcessingOutcome, RunReport};
pub use config::Config;
pub use encoder::{EncoderBackend, EncoderInvoker, FfmpegTranscoder, Transcoder};
pub use error::ShrinkError;
pub use prober::{FfprobeProber, MediaProber};
