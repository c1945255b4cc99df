//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `ShrinkError` enum per categorizzare tutti gli errori possibili
//! - Distingue errori fatali (bloccano tutto il run) da errori per singolo file
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `MissingDependency`: Tool esterno mancante (ffmpeg, ffprobe) - fatale
//! - `InvalidDirectory`: Sorgente mancante o backup annidato nella sorgente - fatale
//! - `Config`: Parametri di configurazione non validi - fatale
//! - `Probe`: Durata non disponibile o non parsabile - per file
//! - `Encode`: Tutti i backend di encoding hanno fallito - per file
//! - `InvalidInput`: Input non valido per il planner (es. durata <= 0)
//! - `Io`: Errori di I/O durante copia/spostamento
//! - `BackupConflict`: Il backup contiene già un file diverso - per file, nulla viene sovrascritto
//!
//! ## Esempio:
//! ```ignore
//! if !tool_exists {
//!     return Err(ShrinkError::MissingDependency("ffmpeg".to_string()));
//! }
//! ```

/// Custom error types for batch video compression
#[derive(thiserror::Error, Debug)]
pub enum ShrinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Invalid directory: {0}")]
    InvalidDirectory(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duration probe failed: {0}")]
    Probe(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Backup conflict: {0}")]
    BackupConflict(String),
}

impl ShrinkError {
    /// Fatal errors abort the whole run before any file is processed
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency(_) | Self::InvalidDirectory(_) | Self::Config(_)
        )
    }

    /// Short kind label used in reports and JSON events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io-error",
            Self::MissingDependency(_) => "missing-dependency",
            Self::InvalidDirectory(_) => "invalid-directory",
            Self::Config(_) => "invalid-config",
            Self::InvalidInput(_) => "invalid-input",
            Self::Probe(_) => "duration-probe-error",
            Self::Encode(_) => "encode-error",
            Self::BackupConflict(_) => "backup-conflict",
        }
    }
}
