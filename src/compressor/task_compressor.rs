//! # Task Compressor Module
//!
//! Worker per la compressione di un singolo file.
//! Il lavoro è diviso in due fasi:
//! - `prepare`: probe, calcolo bitrate ed encoding verso un file temporaneo (interrompibile)
//! - `finalize`: spostamenti nell'albero di backup e sostituzione (mai interrotta a metà)

use crate::{
    bitrate::{self, BitratePlan, SizeBudget},
    compressor::{backup_resolver::BackupResolver, report::ProcessingOutcome},
    config::Config,
    encoder::{EncodedOutput, EncoderInvoker},
    error::ShrinkError,
    file_manager::{FileManager, VideoFile, TEMP_MARKER},
    prober::MediaProber,
    utils::display_name,
};
use anyhow::{Context, Result};
use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Work done for a file before anything is moved
pub enum PreparedFile {
    /// Within budget, only needs a backup copy (unless it already has one)
    WithinBudget { backed_up: bool },
    /// Dry run result
    Planned { duration_seconds: f64, plan: BitratePlan },
    /// Encoded output waiting next to the original; deleted if dropped
    Encoded {
        temp_output: TempPath,
        encoded: EncodedOutput,
        plan: BitratePlan,
        backed_up: bool,
    },
}

/// Worker per elaborazione singoli file
pub struct TaskCompressor<'a> {
    config: &'a Config,
    budget: SizeBudget,
    prober: &'a dyn MediaProber,
    invoker: &'a EncoderInvoker,
    resolver: &'a BackupResolver,
}

impl<'a> TaskCompressor<'a> {
    pub fn new(
        config: &'a Config,
        prober: &'a dyn MediaProber,
        invoker: &'a EncoderInvoker,
        resolver: &'a BackupResolver,
    ) -> Self {
        Self {
            config,
            budget: config.size_budget(),
            prober,
            invoker,
            resolver,
        }
    }

    /// Probe, plan and encode. Dropping the returned future kills the
    /// encoder and deletes the temporary output.
    pub async fn prepare(&self, file: &VideoFile) -> Result<PreparedFile> {
        let backed_up = self.existing_backup(file).await?;

        if !self.budget.exceeds(file.size) {
            debug!(
                "{} is {} (limit {}), no compression needed",
                file.relative_path.display(),
                FileManager::format_size(file.size),
                FileManager::format_size(self.budget.max_bytes)
            );
            return Ok(PreparedFile::WithinBudget { backed_up });
        }

        let duration_seconds = self.prober.probe_duration(&file.path).await?;
        let plan = bitrate::plan(
            duration_seconds,
            self.budget.target_bytes,
            self.config.audio_bitrate_bps(),
            self.config.min_video_bitrate_bps(),
        )?;

        info!(
            "{}: {} over {:.2}s -> video {}k, audio {}k, buffer {}k (estimated {})",
            file.relative_path.display(),
            FileManager::format_size(file.size),
            duration_seconds,
            plan.video_kbps(),
            plan.audio_kbps(),
            plan.buffer_kbps(),
            FileManager::format_size(plan.estimated_output_bytes(duration_seconds))
        );

        if plan.floor_reached {
            if self.config.strict {
                return Err(ShrinkError::InvalidInput(format!(
                    "{:.2}s cannot fit in {} even at {}k video (strict mode)",
                    duration_seconds,
                    FileManager::format_size(self.budget.target_bytes),
                    plan.video_kbps()
                ))
                .into());
            }
            warn!(
                "{}: budget too small for {:.2}s, encoding at the minimum {}k; output will likely exceed {}",
                file.relative_path.display(),
                duration_seconds,
                plan.video_kbps(),
                FileManager::format_size(self.budget.max_bytes)
            );
        }

        if self.config.dry_run {
            return Ok(PreparedFile::Planned {
                duration_seconds,
                plan,
            });
        }

        let temp_output = create_temp_output(&file.path)?;
        let encoded = self.invoker.encode(&file.path, &temp_output, &plan).await?;

        Ok(PreparedFile::Encoded {
            temp_output,
            encoded,
            plan,
            backed_up,
        })
    }

    /// `true` when the backup tree already holds this exact file.
    ///
    /// A different file at the backup path is a conflict: it is most likely
    /// the original of a file compressed by an earlier run.
    async fn existing_backup(&self, file: &VideoFile) -> Result<bool> {
        let backup_path = self.resolver.backup_path(file);
        let exists = tokio::fs::try_exists(&backup_path)
            .await
            .with_context(|| format!("Failed to check {}", backup_path.display()))?;
        if !exists {
            return Ok(false);
        }

        if FileManager::same_contents(&file.path, &backup_path).await? {
            debug!("{} is already in the backup tree", file.relative_path.display());
            return Ok(true);
        }

        Err(ShrinkError::BackupConflict(format!(
            "{} already holds a different file, leaving {} untouched",
            backup_path.display(),
            file.relative_path.display()
        ))
        .into())
    }

    /// Relocate files according to the prepared result
    pub async fn finalize(&self, file: &VideoFile, prepared: PreparedFile) -> Result<ProcessingOutcome> {
        match prepared {
            PreparedFile::WithinBudget { backed_up } => {
                let backup_path = self.resolver.backup_path(file);
                if !backed_up && !self.config.dry_run {
                    FileManager::copy_file(&file.path, &backup_path).await?;
                    debug!("Copied {} -> {}", file.path.display(), backup_path.display());
                }
                Ok(ProcessingOutcome::Skipped { size: file.size })
            }
            PreparedFile::Planned {
                duration_seconds,
                plan,
            } => Ok(ProcessingOutcome::Planned {
                size: file.size,
                duration_seconds,
                plan,
            }),
            PreparedFile::Encoded {
                temp_output,
                encoded,
                plan,
                backed_up,
            } => {
                self.replace_with_encoded(file, temp_output, encoded, plan, backed_up)
                    .await
            }
        }
    }

    /// Move the original to the backup tree and the encoded output to the original path
    async fn replace_with_encoded(
        &self,
        file: &VideoFile,
        temp_output: TempPath,
        encoded: EncodedOutput,
        plan: BitratePlan,
        backed_up: bool,
    ) -> Result<ProcessingOutcome> {
        let backup_path = self.resolver.backup_path(file);

        match tokio::fs::metadata(&file.path).await {
            Ok(metadata) => {
                if let Err(e) = tokio::fs::set_permissions(&temp_output, metadata.permissions()).await {
                    warn!("Could not copy permissions to {}: {}", display_name(&file.path), e);
                }
            }
            Err(e) => warn!("Could not read permissions of {}: {}", file.path.display(), e),
        }

        if backed_up {
            // Identical copy already in the backup tree: replace in place
            temp_output
                .persist(&file.path)
                .map_err(|e| ShrinkError::Io(e.error))
                .context("Failed to place encoded output")?;
        } else {
            Self::move_and_place(file, &backup_path, temp_output).await?;
        }

        let size_exceeded = encoded.size_bytes > self.budget.max_bytes;
        if size_exceeded {
            warn!(
                "{}: compressed output {} still exceeds {}, keeping it",
                file.relative_path.display(),
                FileManager::format_size(encoded.size_bytes),
                FileManager::format_size(self.budget.max_bytes)
            );
        }
        if encoded.size_bytes >= file.size {
            warn!(
                "{}: compressed output is not smaller than the original",
                file.relative_path.display()
            );
        }

        Ok(ProcessingOutcome::Compressed {
            original_size: file.size,
            compressed_size: encoded.size_bytes,
            backend: encoded.backend,
            size_exceeded,
            floor_reached: plan.floor_reached,
        })
    }

    /// Original to the backup tree, then encoded output to the original path.
    /// If the second step fails the original is moved back.
    async fn move_and_place(file: &VideoFile, backup_path: &Path, temp_output: TempPath) -> Result<()> {
        FileManager::move_file(&file.path, backup_path)
            .await
            .context("Failed to move original to backup")?;

        if let Err(persist_err) = temp_output.persist(&file.path) {
            let cause = persist_err.error;
            // Dropping the path deletes the encoded output
            drop(persist_err.path);
            FileManager::move_file(backup_path, &file.path)
                .await
                .context("Failed to restore original after replacement error")?;
            return Err(ShrinkError::Io(cause)).context("Failed to place encoded output");
        }
        Ok(())
    }

    /// Prepare and finalize in one step
    pub async fn process(&self, file: &VideoFile) -> ProcessingOutcome {
        let result = match self.prepare(file).await {
            Ok(prepared) => self.finalize(file, prepared).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| failure_outcome(&e))
    }
}

/// Hidden temporary file next to the source so the final move is a rename
fn create_temp_output(source: &Path) -> Result<TempPath> {
    let parent = source
        .parent()
        .ok_or_else(|| anyhow::anyhow!("{} has no parent directory", source.display()))?;
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{}{}", stem, TEMP_MARKER))
        .suffix(".mp4")
        .tempfile_in(parent)
        .map_err(ShrinkError::Io)
        .with_context(|| format!("Failed to create temporary output in {}", parent.display()))?;

    Ok(temp.into_temp_path())
}

/// Convert an error into a `Failed` outcome, keeping the error kind
pub fn failure_outcome(error: &anyhow::Error) -> ProcessingOutcome {
    let kind = error
        .downcast_ref::<ShrinkError>()
        .map(|e| e.kind())
        .unwrap_or("io-error");
    ProcessingOutcome::Failed {
        kind,
        reason: format!("{:#}", error),
    }
}
