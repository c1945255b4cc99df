//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` immutabile passata all'orchestratore
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `max_size_mb`: Dimensione massima per file (default: 10 MB)
//! - `safety_factor`: Margine applicato al target (0.0-1.0, default: 0.95)
//! - `min_video_bitrate_kbps`: Bitrate video minimo (default: 200 kbps)
//! - `audio_bitrate_kbps`: Bitrate audio fisso (default: 128 kbps)
//! - `extensions`: Estensioni video riconosciute (case-insensitive)
//! - `backends`: Ordine preferito degli encoder (vuoto = auto-detect)
//! - `strict`: Fallisce invece di avvisare se il budget non è raggiungibile
//! - `dry_run`: Solo probe e calcolo bitrate, nessuna modifica ai file
//!
//! ## Validazione:
//! - Controlla che max_size_mb sia > 0
//! - Controlla che safety_factor sia in (0.0, 1.0]
//! - Controlla che i bitrate siano > 0
//! - Controlla che ci sia almeno un'estensione
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     max_size_mb: 25,
//!     audio_bitrate_kbps: 96,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::bitrate::SizeBudget;
use crate::encoder::EncoderBackend;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Video extensions scanned when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "wmv", "flv", "mpg", "mpeg", "3gp", "ts",
];

/// Configuration for a compression run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory tree scanned for videos
    pub source_dir: PathBuf,
    /// Directory receiving the originals, mirroring the source layout
    pub backup_dir: PathBuf,
    /// Size ceiling per file, in megabytes
    pub max_size_mb: u64,
    /// Fraction of the ceiling the planner aims for
    pub safety_factor: f64,
    /// Lowest video bitrate handed to the encoder
    pub min_video_bitrate_kbps: u64,
    /// Fixed audio bitrate
    pub audio_bitrate_kbps: u64,
    /// Recognized video extensions, without the dot
    pub extensions: Vec<String>,
    /// Encoder backends in priority order (empty = detect)
    pub backends: Vec<EncoderBackend>,
    /// Fail files whose budget cannot be met instead of encoding at the minimum bitrate
    pub strict: bool,
    /// Probe and plan only
    pub dry_run: bool,
    /// Output progress and results as JSON
    pub json_output: bool,
    /// Per-attempt encode timeout in seconds
    pub encode_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::new(),
            backup_dir: PathBuf::new(),
            max_size_mb: 10,
            safety_factor: 0.95,
            min_video_bitrate_kbps: 200,
            audio_bitrate_kbps: 128,
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            backends: Vec::new(),
            strict: false,
            dry_run: false,
            json_output: false,
            encode_timeout_secs: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_size_mb == 0 {
            return Err(anyhow::anyhow!("Target size must be at least 1 MB"));
        }

        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return Err(anyhow::anyhow!("Safety factor must be between 0.0 (exclusive) and 1.0"));
        }

        if self.min_video_bitrate_kbps == 0 {
            return Err(anyhow::anyhow!("Minimum video bitrate must be greater than 0"));
        }

        if self.audio_bitrate_kbps == 0 {
            return Err(anyhow::anyhow!("Audio bitrate must be greater than 0"));
        }

        if self.extensions.iter().all(|ext| ext.trim().is_empty()) {
            return Err(anyhow::anyhow!("At least one video extension is required"));
        }

        if self.encode_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Encode timeout must be greater than 0 seconds"));
        }

        Ok(())
    }

    pub fn size_budget(&self) -> SizeBudget {
        SizeBudget::from_megabytes(self.max_size_mb, self.safety_factor)
    }

    pub fn audio_bitrate_bps(&self) -> u64 {
        self.audio_bitrate_kbps * 1000
    }

    pub fn min_video_bitrate_bps(&self) -> u64 {
        self.min_video_bitrate_kbps * 1000
    }

    /// Extensions lowercased with any leading dot removed
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("video-shrinker").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
