//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery dei video.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva dei file video in una directory (ordine deterministico)
//! - Filtro per estensione case-insensitive
//! - Copia e spostamento con creazione on-demand delle directory
//! - Utilità per calcoli dimensioni e percentuali
//!
//! ## Operazioni sui file:
//! - `find_video_files()`: Trova tutti i video sotto la directory sorgente
//! - `copy_file()`: Copia verbatim (file piccoli verso il backup)
//! - `move_file()`: Hard link + rimozione, con fallback copia + rimozione tra filesystem diversi
//! - `same_contents()`: Confronto byte a byte (backup già presente)
//!
//! Copia e spostamento non sovrascrivono mai un file esistente.
//!
//! ## Utilità:
//! - `format_size()`: Converte bytes in formato leggibile (KB, MB, GB)
//! - `calculate_reduction()`: Calcola percentuale di riduzione
//!
//! ## Esempio:
//! ```ignore
//! let files = FileManager::find_video_files(&source, &config.normalized_extensions())?;
//! for file in files {
//!     println!("{} ({})", file.relative_path.display(), FileManager::format_size(file.size));
//! }
//! ```

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, warn};
use walkdir::WalkDir;

const COMPARE_CHUNK: usize = 64 * 1024;

/// Marker embedded in the names of in-flight encoder outputs
pub const TEMP_MARKER: &str = ".shrinking-";

/// A video discovered during the tree scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFile {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Size in bytes at scan time
    pub size: u64,
    /// Path relative to the source root
    pub relative_path: PathBuf,
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all videos under `root`, sorted by path.
    ///
    /// `extensions` must be lowercase and without the leading dot.
    pub fn find_video_files(root: &Path, extensions: &[String]) -> Result<Vec<VideoFile>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if Self::is_temp_artifact(path) || !Self::has_video_extension(path, extensions) {
                continue;
            }

            let size = entry
                .metadata()
                .with_context(|| format!("Failed to read metadata for {}", path.display()))?
                .len();
            let relative_path = path
                .strip_prefix(root)
                .with_context(|| format!("{} is outside {}", path.display(), root.display()))?
                .to_path_buf();

            files.push(VideoFile {
                path: path.to_path_buf(),
                size,
                relative_path,
            });
        }

        Ok(files)
    }

    /// Check if a file has one of the recognized video extensions
    pub fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
        match path.extension() {
            Some(ext) => {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                extensions.iter().any(|known| *known == ext_lower)
            }
            None => false,
        }
    }

    /// Encoder output left behind by an interrupted run
    pub fn is_temp_artifact(path: &Path) -> bool {
        path.file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.starts_with('.') && name.contains(TEMP_MARKER)
            })
            .unwrap_or(false)
    }

    /// Create the parent directories of `path` if necessary
    pub async fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directories for {}", path.display()))?;
        }
        Ok(())
    }

    /// Copy a file verbatim, creating parent directories.
    ///
    /// Never overwrites: fails with `AlreadyExists` if `to` is present.
    pub async fn copy_file(from: &Path, to: &Path) -> Result<u64> {
        Self::ensure_parent_dirs(to).await?;
        copy_new(from, to)
            .await
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))
    }

    /// Move a file, creating parent directories.
    ///
    /// Never overwrites an existing `to`. A hard link plus removal is tried
    /// first; across filesystems it falls back to copy + remove, and the
    /// source is only removed once the copy is complete.
    pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
        Self::ensure_parent_dirs(to).await?;

        match fs::hard_link(from, to).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(e).with_context(|| {
                    format!("Refusing to move {} over existing {}", from.display(), to.display())
                });
            }
            Err(e) => {
                debug!(
                    "Link {} -> {} failed ({}), copying instead",
                    from.display(),
                    to.display(),
                    e
                );
                copy_new(from, to).await.with_context(|| {
                    format!("Failed to move {} to {}", from.display(), to.display())
                })?;
            }
        }

        fs::remove_file(from)
            .await
            .with_context(|| format!("Failed to remove {} after moving it", from.display()))
    }

    /// Whether two files hold exactly the same bytes
    pub async fn same_contents(a: &Path, b: &Path) -> Result<bool> {
        let len_a = fs::metadata(a).await.with_context(|| format!("Failed to stat {}", a.display()))?.len();
        let len_b = fs::metadata(b).await.with_context(|| format!("Failed to stat {}", b.display()))?.len();
        if len_a != len_b {
            return Ok(false);
        }

        let mut reader_a = BufReader::new(fs::File::open(a).await?);
        let mut reader_b = BufReader::new(fs::File::open(b).await?);
        let mut buf_a = vec![0u8; COMPARE_CHUNK];
        let mut buf_b = vec![0u8; COMPARE_CHUNK];

        loop {
            let read = reader_a.read(&mut buf_a).await?;
            if read == 0 {
                return Ok(true);
            }
            reader_b
                .read_exact(&mut buf_b[..read])
                .await
                .with_context(|| format!("{} changed while comparing", b.display()))?;
            if buf_a[..read] != buf_b[..read] {
                return Ok(false);
            }
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

/// Copy into a file that must not exist yet; a partial copy is removed
async fn copy_new(from: &Path, to: &Path) -> std::io::Result<u64> {
    let mut source = fs::File::open(from).await?;
    let permissions = source.metadata().await?.permissions();
    let mut dest = fs::OpenOptions::new().write(true).create_new(true).open(to).await?;

    let result = async {
        let copied = tokio::io::copy(&mut source, &mut dest).await?;
        dest.sync_all().await?;
        fs::set_permissions(to, permissions).await?;
        Ok::<_, std::io::Error>(copied)
    }
    .await;

    if result.is_err() {
        drop(dest);
        let _ = fs::remove_file(to).await;
    }
    result
}
