//! # Backup Path Resolution Module
//!
//! Centralizza la validazione delle directory sorgente/backup e il calcolo
//! dei path speculari nell'albero di backup.

use crate::{error::ShrinkError, file_manager::VideoFile};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Source and backup roots, validated once per run
#[derive(Debug, Clone)]
pub struct BackupResolver {
    source_root: PathBuf,
    backup_root: PathBuf,
}

impl BackupResolver {
    /// Validate the directory pair.
    ///
    /// The source must be an existing directory; the backup root may not
    /// exist yet but must not equal the source or live inside it.
    pub fn new(source_dir: &Path, backup_dir: &Path) -> Result<Self, ShrinkError> {
        if source_dir.as_os_str().is_empty() {
            return Err(ShrinkError::InvalidDirectory("no source directory given".to_string()));
        }
        if backup_dir.as_os_str().is_empty() {
            return Err(ShrinkError::InvalidDirectory("no backup directory given".to_string()));
        }

        if !source_dir.is_dir() {
            return Err(ShrinkError::InvalidDirectory(format!(
                "source directory does not exist: {}",
                source_dir.display()
            )));
        }
        if backup_dir.exists() && !backup_dir.is_dir() {
            return Err(ShrinkError::InvalidDirectory(format!(
                "backup path is not a directory: {}",
                backup_dir.display()
            )));
        }

        let source_root = resolve_path(source_dir)?;
        let backup_root = resolve_path(backup_dir)?;
        debug!("Source root: {}", source_root.display());
        debug!("Backup root: {}", backup_root.display());

        if backup_root == source_root {
            return Err(ShrinkError::InvalidDirectory(format!(
                "backup directory is the same as the source: {}",
                source_root.display()
            )));
        }
        if backup_root.starts_with(&source_root) {
            return Err(ShrinkError::InvalidDirectory(format!(
                "backup directory {} is inside the source directory {}",
                backup_root.display(),
                source_root.display()
            )));
        }

        Ok(Self {
            source_root,
            backup_root,
        })
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Mirrored location of a file under the backup root
    pub fn backup_path(&self, file: &VideoFile) -> PathBuf {
        self.backup_root.join(&file.relative_path)
    }
}

/// Absolute, symlink-free form of a path that may not exist yet.
///
/// The deepest existing ancestor is canonicalized and the remaining
/// components are appended after lexical normalization.
fn resolve_path(path: &Path) -> Result<PathBuf, ShrinkError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let absolute = normalize_lexically(&absolute);

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

/// Remove `.` and resolve `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
