//! # Run Report Module
//!
//! Esito per ogni file (in ordine di scansione) e riepilogo finale del run.

use crate::{
    bitrate::{BitratePlan, SizeBudget},
    encoder::EncoderBackend,
    file_manager::FileManager,
    progress::CompressionStats,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Exit code when every file was handled
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for fatal errors (missing tools, invalid directories, bad config)
pub const EXIT_FATAL: i32 = 1;
/// Exit code when the run completed but some files failed
pub const EXIT_FILE_FAILURES: i32 = 2;
/// Exit code after Ctrl-C
pub const EXIT_INTERRUPTED: i32 = 130;

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// Already within budget: copied to the backup tree, source untouched
    Skipped { size: u64 },
    /// Original moved to the backup tree, encoded output now at the source path
    Compressed {
        original_size: u64,
        compressed_size: u64,
        backend: EncoderBackend,
        /// Output still over the size ceiling (kept anyway)
        size_exceeded: bool,
        /// Encoded at the minimum video bitrate
        floor_reached: bool,
    },
    /// Dry run: probed and planned only
    Planned {
        size: u64,
        duration_seconds: f64,
        plan: BitratePlan,
    },
    /// Left untouched at the source path
    Failed { kind: &'static str, reason: String },
}

impl ProcessingOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn saved_bytes(&self) -> u64 {
        match self {
            Self::Compressed {
                original_size,
                compressed_size,
                ..
            } => original_size.saturating_sub(*compressed_size),
            _ => 0,
        }
    }
}

/// Outcome of one scanned file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub outcome: ProcessingOutcome,
}

impl FileReport {
    /// One-line description used for per-file output
    pub fn summary_line(&self) -> String {
        let name = self.relative_path.display();
        match &self.outcome {
            ProcessingOutcome::Skipped { size } => {
                format!("[SKIP] {}: {} already within budget, copied to backup", name, FileManager::format_size(*size))
            }
            ProcessingOutcome::Compressed {
                original_size,
                compressed_size,
                backend,
                size_exceeded,
                ..
            } => {
                let line = format!(
                    "[OK] {}: {} -> {} ({:.1}% saved, {})",
                    name,
                    FileManager::format_size(*original_size),
                    FileManager::format_size(*compressed_size),
                    FileManager::calculate_reduction(*original_size, *compressed_size),
                    backend
                );
                if *size_exceeded {
                    format!("{} [WARN] still over budget", line)
                } else {
                    line
                }
            }
            ProcessingOutcome::Planned {
                duration_seconds,
                plan,
                ..
            } => format!(
                "[PLAN] {}: {:.2}s -> video {}k, audio {}k, buffer {}k{}",
                name,
                duration_seconds,
                plan.video_kbps(),
                plan.audio_kbps(),
                plan.buffer_kbps(),
                if plan.floor_reached { " [WARN] minimum bitrate" } else { "" }
            ),
            ProcessingOutcome::Failed { kind, reason } => {
                format!("[ERROR] {}: {}: {}", name, kind, reason)
            }
        }
    }
}

/// Everything a run did, in scan order
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub budget: SizeBudget,
    pub entries: Vec<FileReport>,
    /// Files found by the scan (entries may be fewer after an interrupt)
    pub total_files: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.entries.iter().filter(|entry| entry.outcome.is_failure())
    }

    /// Compressed files that still exceed the ceiling or hit the bitrate floor
    pub fn warnings(&self) -> impl Iterator<Item = &FileReport> {
        self.entries.iter().filter(|entry| {
            matches!(
                entry.outcome,
                ProcessingOutcome::Compressed { size_exceeded: true, .. }
                    | ProcessingOutcome::Compressed { floor_reached: true, .. }
            )
        })
    }

    pub fn stats(&self) -> CompressionStats {
        let mut stats = CompressionStats::new();
        for entry in &self.entries {
            stats.record(&entry.outcome);
        }
        stats
    }

    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.failures().next().is_some() {
            EXIT_FILE_FAILURES
        } else {
            EXIT_SUCCESS
        }
    }

    /// Final human-readable summary, failures enumerated last
    pub fn render_summary(&self) -> String {
        let stats = self.stats();
        let mut lines = vec![
            "=== Compression Complete ===".to_string(),
            format!(
                "Size budget: {} (target {})",
                FileManager::format_size(self.budget.max_bytes),
                FileManager::format_size(self.budget.target_bytes)
            ),
            stats.format_summary(),
            format!("Elapsed: {:.1}s", self.elapsed.as_secs_f64()),
        ];

        if self.interrupted {
            lines.push(format!(
                "Interrupted: {} of {} files handled, remaining files untouched",
                self.entries.len(),
                self.total_files
            ));
        }

        let warnings: Vec<_> = self.warnings().collect();
        if !warnings.is_empty() {
            lines.push(format!("--- Warnings ({}) ---", warnings.len()));
            for entry in warnings {
                if let ProcessingOutcome::Compressed {
                    compressed_size,
                    size_exceeded,
                    ..
                } = entry.outcome
                {
                    let reason = if size_exceeded {
                        format!(
                            "output {} exceeds {}",
                            FileManager::format_size(compressed_size),
                            FileManager::format_size(self.budget.max_bytes)
                        )
                    } else {
                        "encoded at the minimum video bitrate".to_string()
                    };
                    lines.push(format!("  {}: {}", entry.relative_path.display(), reason));
                }
            }
        }

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            lines.push(format!("--- Failures ({}) ---", failures.len()));
            for entry in failures {
                if let ProcessingOutcome::Failed { kind, reason } = &entry.outcome {
                    lines.push(format!("  {}: {}: {}", entry.relative_path.display(), kind, reason));
                }
            }
        }

        lines.join("\n")
    }
}
