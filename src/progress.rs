//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di compressione.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche del run (file compressi, saltati, falliti, byte risparmiati)
//! - Stampa delle righe per-file sopra la progress bar
//!
//! ## Componenti principali:
//! - `ProgressManager`: Gestisce la progress bar principale
//! - `CompressionStats`: Traccia statistiche cumulative
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [========================>---------------] 12/20 (60%) clip.mov
//! ```

use crate::compressor::report::ProcessingOutcome;
use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a compression run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress manager that draws nothing (JSON mode, tests)
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Advance by one file with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Print a line to stdout without corrupting the bar
    pub fn println(&self, line: &str) {
        self.bar.suspend(|| println!("{}", line));
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Statistics tracker for compression results
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompressionStats {
    pub files_processed: usize,
    pub files_compressed: usize,
    pub files_skipped: usize,
    pub files_planned: usize,
    pub errors: usize,
    pub over_budget: usize,
    pub total_bytes_saved: u64,
    /// Size of the originals that were compressed
    pub total_original_size: u64,
}

impl CompressionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &ProcessingOutcome) {
        self.files_processed += 1;
        match outcome {
            ProcessingOutcome::Skipped { .. } => self.files_skipped += 1,
            ProcessingOutcome::Planned { .. } => self.files_planned += 1,
            ProcessingOutcome::Failed { .. } => self.errors += 1,
            ProcessingOutcome::Compressed {
                original_size,
                size_exceeded,
                ..
            } => {
                self.files_compressed += 1;
                self.total_original_size += original_size;
                self.total_bytes_saved += outcome.saved_bytes();
                if *size_exceeded {
                    self.over_budget += 1;
                }
            }
        }
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Processed: {} files | Compressed: {} | Skipped: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.files_compressed,
            self.files_skipped,
            self.errors,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        );
        if self.files_planned > 0 {
            summary.push_str(&format!(" | Planned (dry run): {}", self.files_planned));
        }
        summary
    }
}
