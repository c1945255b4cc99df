//! # Tool Path Resolver
//!
//! Finds the external multimedia tools (ffmpeg, ffprobe) either in an
//! override directory or in the system `PATH`.

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable pointing at a directory holding the tools
pub const TOOLS_DIR_ENV: &str = "VIDEO_SHRINKER_TOOLS_DIR";

/// Tool path resolver for system and override locations
#[derive(Debug, Clone)]
pub struct ToolPathResolver {
    /// Directory checked before `PATH`
    tools_dir: Option<PathBuf>,
    /// Directories from `PATH`, in order
    search_path: Vec<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver from the current environment
    pub fn new() -> Self {
        let tools_dir = env::var_os(TOOLS_DIR_ENV)
            .map(PathBuf::from)
            .filter(|dir| {
                let exists = dir.is_dir();
                if !exists {
                    warn!("{} points to a missing directory: {}", TOOLS_DIR_ENV, dir.display());
                }
                exists
            });

        let search_path = env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();

        Self::with_locations(tools_dir, search_path)
    }

    /// Create a resolver over explicit locations
    pub fn with_locations(tools_dir: Option<PathBuf>, search_path: Vec<PathBuf>) -> Self {
        Self {
            tools_dir,
            search_path,
        }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let file_name = executable_name(tool_name);

        if let Some(ref tools_dir) = self.tools_dir {
            let candidate = tools_dir.join(&file_name);
            if is_executable_file(&candidate) {
                debug!("Using tool from {}: {} -> {:?}", TOOLS_DIR_ENV, tool_name, candidate);
                return Some(candidate);
            }
            debug!("{} not found in override directory {:?}", tool_name, tools_dir);
        }

        let found = self
            .search_path
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| is_executable_file(path));

        match found {
            Some(ref path) => debug!("Using system tool: {} -> {:?}", tool_name, path),
            None => debug!("Tool not found in PATH: {}", tool_name),
        }
        found
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Installation hint shown next to a missing tool
    pub fn install_instructions(tool_name: &str) -> String {
        match tool_name {
            "ffmpeg" | "ffprobe" => {
                if cfg!(target_os = "macos") {
                    "brew install ffmpeg".to_string()
                } else if cfg!(windows) {
                    "winget install ffmpeg".to_string()
                } else {
                    "sudo apt-get install ffmpeg".to_string()
                }
            }
            _ => format!("install {} and make sure it is in PATH", tool_name),
        }
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn executable_name(tool_name: &str) -> String {
    if cfg!(windows) && !tool_name.ends_with(".exe") {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    }
}

fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
