//! # Platform-specific utilities
//!
//! Questo modulo centralizza tutta la logica per la gestione cross-platform
//! dei comandi esterni: risoluzione di ffmpeg/ffprobe, verifica dipendenze
//! e rilevamento degli encoder hardware compilati in ffmpeg.

use crate::encoder::EncoderBackend;
use crate::error::ShrinkError;
use crate::tool_resolver::ToolPathResolver;
use std::ffi::OsString;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Tools the compressor cannot run without
pub const REQUIRED_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Platform-specific command manager with tool resolution
pub struct PlatformCommands {
    tool_resolver: ToolPathResolver,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(|| Self::with_resolver(ToolPathResolver::new()))
    }

    pub fn with_resolver(tool_resolver: ToolPathResolver) -> Self {
        Self { tool_resolver }
    }

    /// Program to spawn for a tool: the resolved path, or the bare name
    pub fn get_command(&self, base_name: &str) -> OsString {
        self.tool_resolver
            .resolve_tool(base_name)
            .map(|path| path.into_os_string())
            .unwrap_or_else(|| OsString::from(base_name))
    }

    /// Check if a command is available on the system
    pub fn is_command_available(&self, base_name: &str) -> bool {
        self.tool_resolver.is_tool_available(base_name)
    }

    /// Check that every required tool is available
    pub fn check_dependencies(&self) -> Result<(), ShrinkError> {
        for tool in REQUIRED_TOOLS {
            if !self.is_command_available(tool) {
                return Err(ShrinkError::MissingDependency(format!(
                    "{} is required for video compression (install with: {})",
                    tool,
                    ToolPathResolver::install_instructions(tool)
                )));
            }
        }
        Ok(())
    }

    /// Encoder backends usable with the local ffmpeg build, in priority order.
    ///
    /// A hardware encoder being compiled in does not guarantee a device is
    /// present; the invoker falls back when an attempt fails.
    pub async fn available_backends(&self) -> Vec<EncoderBackend> {
        let output = tokio::process::Command::new(self.get_command("ffmpeg"))
            .args(["-hide_banner", "-encoders"])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let listing = String::from_utf8_lossy(&output.stdout);
                let backends = backends_from_encoder_list(&listing);
                info!(
                    "Encoder backends: {}",
                    backends.iter().map(|b| b.id()).collect::<Vec<_>>().join(" -> ")
                );
                backends
            }
            Ok(output) => {
                warn!(
                    "ffmpeg -encoders failed ({}), using software encoding only",
                    output.status
                );
                vec![EncoderBackend::Software]
            }
            Err(e) => {
                warn!("Could not list ffmpeg encoders: {}, using software encoding only", e);
                vec![EncoderBackend::Software]
            }
        }
    }

    /// Get system information for debugging
    pub fn system_info() -> SystemInfo {
        SystemInfo {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            family: std::env::consts::FAMILY,
        }
    }
}

/// Parse `ffmpeg -encoders` output into an ordered backend list.
///
/// Hardware backends come first in `EncoderBackend::ALL` order; software is
/// always appended last.
pub fn backends_from_encoder_list(listing: &str) -> Vec<EncoderBackend> {
    let encoder_names: Vec<&str> = listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();

    let mut backends: Vec<EncoderBackend> = EncoderBackend::ALL
        .iter()
        .copied()
        .filter(|backend| backend.is_hardware())
        .filter(|backend| encoder_names.contains(&backend.ffmpeg_encoder()))
        .collect();

    debug!("Hardware encoders compiled into ffmpeg: {:?}", backends);
    backends.push(EncoderBackend::Software);
    backends
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}
