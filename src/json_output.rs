//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (una riga per evento su stdout)
//! per chi integra il compressore in altri strumenti.
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del run (directory, numero di file, configurazione)
//! - `file_complete`: Esito di un singolo file
//! - `complete`: Fine del run con statistiche e lista dei fallimenti
//! - `error`: Errore fatale prima o durante il run

use crate::compressor::report::{FileReport, ProcessingOutcome, RunReport};
use crate::config::Config;
use crate::encoder::EncoderBackend;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Inizio del run
    Start {
        source_dir: PathBuf,
        backup_dir: PathBuf,
        total_files: usize,
        config: JsonConfig,
    },

    /// Fine elaborazione di un file
    FileComplete {
        index: usize,
        total: usize,
        path: PathBuf,
        relative_path: PathBuf,
        outcome: ProcessingOutcome,
    },

    /// Run completato (o interrotto)
    Complete {
        files_processed: usize,
        files_compressed: usize,
        files_skipped: usize,
        errors: usize,
        total_bytes_saved: u64,
        average_reduction: f64,
        duration_seconds: f64,
        interrupted: bool,
        failures: Vec<PathBuf>,
    },

    /// Errore fatale
    Error {
        kind: String,
        message: String,
    },
}

/// Configurazione riportata nel messaggio di start
#[derive(Debug, Serialize)]
pub struct JsonConfig {
    pub max_bytes: u64,
    pub target_bytes: u64,
    pub min_video_bitrate_kbps: u64,
    pub audio_bitrate_kbps: u64,
    pub backends: Vec<EncoderBackend>,
    pub strict: bool,
    pub dry_run: bool,
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(
        source_dir: PathBuf,
        backup_dir: PathBuf,
        total_files: usize,
        config: JsonConfig,
    ) -> Self {
        Self::Start {
            source_dir,
            backup_dir,
            total_files,
            config,
        }
    }

    pub fn file_complete(index: usize, total: usize, report: &FileReport) -> Self {
        Self::FileComplete {
            index,
            total,
            path: report.path.clone(),
            relative_path: report.relative_path.clone(),
            outcome: report.outcome.clone(),
        }
    }

    pub fn complete(report: &RunReport) -> Self {
        let stats = report.stats();
        Self::Complete {
            files_processed: stats.files_processed,
            files_compressed: stats.files_compressed,
            files_skipped: stats.files_skipped,
            errors: stats.errors,
            total_bytes_saved: stats.total_bytes_saved,
            average_reduction: stats.overall_reduction_percent(),
            duration_seconds: report.elapsed.as_secs_f64(),
            interrupted: report.interrupted,
            failures: report.failures().map(|entry| entry.path.clone()).collect(),
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl JsonConfig {
    pub fn new(config: &Config, backends: &[EncoderBackend]) -> Self {
        let budget = config.size_budget();
        Self {
            max_bytes: budget.max_bytes,
            target_bytes: budget.target_bytes,
            min_video_bitrate_kbps: config.min_video_bitrate_kbps,
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            backends: backends.to_vec(),
            strict: config.strict,
            dry_run: config.dry_run,
        }
    }
}
