//! # Compressor Module
//!
//! Orchestratore del run, separato in sottomoduli:
//! - `batch_compressor`: Orchestratore principale (scan, decisioni, interruzione)
//! - `task_compressor`: Worker per singoli file
//! - `backup_resolver`: Validazione directory e path speculari di backup
//! - `progress_tracker`: Progress bar, righe per-file ed eventi JSON
//! - `report`: Esiti per file e riepilogo finale

pub mod backup_resolver;
pub mod batch_compressor;
pub mod progress_tracker;
pub mod report;
pub mod task_compressor;

pub use backup_resolver::BackupResolver;
pub use batch_compressor::BatchCompressor;
pub use progress_tracker::{OutputMode, ProgressTracker};
pub use report::{FileReport, ProcessingOutcome, RunReport};
pub use task_compressor::TaskCompressor;
