//! # Media Probing Module
//!
//! Legge la durata di un video tramite ffprobe. L'orchestratore usa il trait
//! `MediaProber`, così i test possono sostituire ffprobe con un fake.

use crate::error::ShrinkError;
use crate::platform::PlatformCommands;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tracing::debug;

/// Media inspection collaborator
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Duration of the media file in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64, ShrinkError>;
}

/// Prober backed by the ffprobe binary
#[derive(Debug, Default)]
pub struct FfprobeProber;

impl FfprobeProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe_duration(&self, path: &Path) -> Result<f64, ShrinkError> {
        let platform = PlatformCommands::instance();

        let output = tokio::process::Command::new(platform.get_command("ffprobe"))
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ShrinkError::Probe(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(ShrinkError::Probe(format!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let duration = parse_duration(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Duration of {}: {:.2}s", path.display(), duration);
        Ok(duration)
    }
}

/// Extract `format.duration` from ffprobe JSON output
pub fn parse_duration(json: &str) -> Result<f64, ShrinkError> {
    let info: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| ShrinkError::Probe(format!("unparseable ffprobe output: {}", e)))?;

    let raw = &info["format"]["duration"];
    let duration = match raw {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .ok_or_else(|| ShrinkError::Probe(format!("duration unavailable ({})", raw)))?;

    if !duration.is_finite() || duration <= 0.0 {
        return Err(ShrinkError::Probe(format!("invalid duration {}", duration)));
    }

    Ok(duration)
}
