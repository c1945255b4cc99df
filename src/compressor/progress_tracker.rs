//! # Progress Tracking Module
//!
//! Unifica progress bar, righe per-file su stdout ed eventi JSON.
//! Il run è sequenziale, quindi il tracker non ha bisogno di lock.

use crate::{
    compressor::report::{FileReport, RunReport},
    file_manager::VideoFile,
    json_output::JsonMessage,
    progress::ProgressManager,
};

/// Dove vanno i risultati del run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Progress bar + righe leggibili
    Human,
    /// Eventi JSON su stdout
    Json,
    /// Nessun output (test, uso come libreria)
    Silent,
}

/// Tracker progress unificato per il run
pub struct ProgressTracker {
    total_files: usize,
    mode: OutputMode,
    progress_manager: ProgressManager,
}

impl ProgressTracker {
    /// Crea un nuovo tracker
    pub fn new(total_files: usize, mode: OutputMode) -> Self {
        let progress_manager = match mode {
            OutputMode::Human => ProgressManager::new(total_files as u64),
            OutputMode::Json | OutputMode::Silent => ProgressManager::hidden(),
        };

        Self {
            total_files,
            mode,
            progress_manager,
        }
    }

    /// Mostra il file in lavorazione
    pub fn file_started(&self, file: &VideoFile) {
        self.progress_manager
            .set_message(&file.relative_path.display().to_string());
    }

    /// Stampa l'esito del file e avanza la barra
    pub fn file_finished(&self, index: usize, report: &FileReport) {
        match self.mode {
            OutputMode::Human => self.progress_manager.println(&report.summary_line()),
            OutputMode::Json => JsonMessage::file_complete(index, self.total_files, report).emit(),
            OutputMode::Silent => {}
        }
        self.progress_manager.update("");
    }

    /// Chiude la barra e stampa il riepilogo finale
    pub fn finish(&self, report: &RunReport) {
        self.progress_manager.finish();
        match self.mode {
            OutputMode::Human => println!("{}", report.render_summary()),
            OutputMode::Json => JsonMessage::complete(report).emit(),
            OutputMode::Silent => {}
        }
    }
}
