//! # Batch Compressor Main Orchestrator
//!
//! Orchestratore principale che delega responsabilità ai moduli specializzati.
//!
//! ## Flusso di esecuzione:
//! 1. **Validazione**: directory sorgente/backup verificate una sola volta, prima della scansione
//! 2. **Discovery**: trova tutti i video (ordine deterministico)
//! 3. **Processing sequenziale**: un file alla volta, probe → piano → encoding → spostamenti
//! 4. **Report**: esito per file in ordine di scansione + riepilogo finale
//!
//! ## Tabella decisionale per file:
//! - backup già presente e diverso: nulla viene toccato → `Failed(backup-conflict)`
//! - size <= max: copia nel backup (se non già presente), sorgente intatta → `Skipped`
//! - probe fallito: file intatto → `Failed(duration-probe-error)`
//! - encoding riuscito: originale nel backup, output compresso al suo posto → `Compressed`
//! - encoding fallito: temporaneo rimosso, originale intatto → `Failed(encode-error)`
//!
//! ## Interruzione (Ctrl-C):
//! - Probe ed encoding in corso vengono abbandonati (ffmpeg terminato, temporaneo cancellato)
//! - Gli spostamenti già iniziati vengono sempre completati
//! - I file rimanenti non vengono toccati

use crate::{
    compressor::{
        backup_resolver::BackupResolver,
        progress_tracker::{OutputMode, ProgressTracker},
        report::{FileReport, ProcessingOutcome, RunReport},
        task_compressor::{failure_outcome, TaskCompressor},
    },
    config::Config,
    encoder::{EncoderBackend, EncoderInvoker, FfmpegTranscoder},
    error::ShrinkError,
    file_manager::{FileManager, VideoFile},
    json_output::{JsonConfig, JsonMessage},
    platform::PlatformCommands,
    prober::{FfprobeProber, MediaProber},
};
use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Orchestratore principale del run
pub struct BatchCompressor {
    config: Config,
    prober: Box<dyn MediaProber>,
    invoker: EncoderInvoker,
    output_mode: OutputMode,
}

impl BatchCompressor {
    /// Crea l'orchestratore con prober e invoker espliciti
    pub fn new(config: Config, prober: Box<dyn MediaProber>, invoker: EncoderInvoker) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ShrinkError::Config(format!("{:#}", e)))?;

        let output_mode = if config.json_output {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Ok(Self {
            config,
            prober,
            invoker,
            output_mode,
        })
    }

    /// Crea l'orchestratore con ffprobe/ffmpeg, dopo aver verificato le dipendenze
    pub async fn with_system_tools(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ShrinkError::Config(format!("{:#}", e)))?;

        let platform = PlatformCommands::instance();
        platform.check_dependencies()?;

        let backends = if config.backends.is_empty() {
            platform.available_backends().await
        } else {
            config.backends.clone()
        };
        let timeout = config.encode_timeout_secs.map(Duration::from_secs);
        let invoker = EncoderInvoker::new(backends, Box::new(FfmpegTranscoder::new(timeout)));

        Self::new(config, Box::new(FfprobeProber::new()), invoker)
    }

    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backends(&self) -> &[EncoderBackend] {
        self.invoker.backends()
    }

    /// Esegue il run fino alla fine o fino a Ctrl-C
    pub async fn run(&self) -> Result<RunReport> {
        self.run_until(ctrl_c()).await
    }

    /// Esegue il run; `shutdown` che si completa equivale a un'interruzione
    pub async fn run_until<F>(&self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();

        // Directory validate prima di qualsiasi scansione
        let resolver = BackupResolver::new(&self.config.source_dir, &self.config.backup_dir)?;

        let files = FileManager::find_video_files(
            resolver.source_root(),
            &self.config.normalized_extensions(),
        )
        .map_err(|e| ShrinkError::Io(std::io::Error::other(format!("{:#}", e))))?;

        self.emit_start_message(&resolver, &files);

        let tracker = ProgressTracker::new(files.len(), self.output_mode);
        let task = TaskCompressor::new(&self.config, self.prober.as_ref(), &self.invoker, &resolver);

        let mut entries = Vec::with_capacity(files.len());
        let mut interrupted = false;
        tokio::pin!(shutdown);

        for (index, file) in files.iter().enumerate() {
            tracker.file_started(file);

            let prepared = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    interrupted = true;
                    break;
                }
                result = task.prepare(file) => result,
            };

            let outcome = match prepared {
                Ok(prepared) => task
                    .finalize(file, prepared)
                    .await
                    .unwrap_or_else(|e| failure_outcome(&e)),
                Err(e) => failure_outcome(&e),
            };

            if let ProcessingOutcome::Failed { kind, reason } = &outcome {
                error!("Failed to process {}: {}: {}", file.relative_path.display(), kind, reason);
            }

            let report = file_report(file, outcome);
            tracker.file_finished(index, &report);
            entries.push(report);
        }

        if interrupted {
            warn!(
                "Interrupted: {} of {} files handled, in-flight output removed",
                entries.len(),
                files.len()
            );
        }

        let report = RunReport {
            budget: self.config.size_budget(),
            entries,
            total_files: files.len(),
            interrupted,
            elapsed: start_time.elapsed(),
        };
        tracker.finish(&report);

        Ok(report)
    }

    /// Invia messaggio di inizio e logga la configurazione
    fn emit_start_message(&self, resolver: &BackupResolver, files: &[VideoFile]) {
        if self.output_mode == OutputMode::Json {
            JsonMessage::start(
                resolver.source_root().to_path_buf(),
                resolver.backup_root().to_path_buf(),
                files.len(),
                JsonConfig::new(&self.config, self.backends()),
            )
            .emit();
        }

        let budget = self.config.size_budget();
        info!("Starting video compression in: {}", resolver.source_root().display());
        info!("Backup directory: {}", resolver.backup_root().display());
        info!(
            "Size budget: {} per file (target {})",
            FileManager::format_size(budget.max_bytes),
            FileManager::format_size(budget.target_bytes)
        );
        info!(
            "Audio: {}k | Minimum video: {}k | Backends: {}",
            self.config.audio_bitrate_kbps,
            self.config.min_video_bitrate_kbps,
            self.backends().iter().map(|b| b.id()).collect::<Vec<_>>().join(" -> ")
        );
        if self.config.strict {
            info!("Strict mode: files that cannot fit the budget will fail");
        }
        if self.config.dry_run {
            info!("Dry run mode: No files will be modified");
        }

        if files.is_empty() {
            info!("No video files found to process");
        } else {
            let oversized = files.iter().filter(|f| budget.exceeds(f.size)).count();
            info!(
                "Found {} video files ({} over budget, {} already small)",
                files.len(),
                oversized,
                files.len() - oversized
            );
        }
    }
}

fn file_report(file: &VideoFile, outcome: ProcessingOutcome) -> FileReport {
    FileReport {
        path: file.path.clone(),
        relative_path: file.relative_path.clone(),
        outcome,
    }
}

/// Completes on Ctrl-C; never completes if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C, interruption disabled: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::report::{EXIT_FILE_FAILURES, EXIT_INTERRUPTED, EXIT_SUCCESS};
    use crate::encoder::{TranscodeRequest, TranscodeStatus, Transcoder};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    const MIB: usize = 1024 * 1024;

    /// Fails for files whose name contains "broken"
    struct FakeProber {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MediaProber for FakeProber {
        async fn probe_duration(&self, path: &Path) -> Result<f64, ShrinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().contains("broken") {
                Err(ShrinkError::Probe("duration unavailable".to_string()))
            } else {
                Ok(5.0)
            }
        }
    }

    /// Writes `output_size` bytes of `b'E'`; hardware backends and
    /// "unencodable" inputs fail after leaving partial output
    struct FakeTranscoder {
        output_size: usize,
        inputs: Arc<Mutex<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(
            &self,
            request: &TranscodeRequest,
            backend: EncoderBackend,
        ) -> Result<TranscodeStatus, ShrinkError> {
            self.inputs.lock().unwrap().push(request.input.clone());
            if backend.is_hardware() || request.input.to_string_lossy().contains("unencodable") {
                tokio::fs::write(&request.output, b"partial").await?;
                return Ok(TranscodeStatus::failed(Some(1), "encoder error"));
            }
            tokio::fs::write(&request.output, vec![b'E'; self.output_size]).await?;
            Ok(TranscodeStatus::succeeded())
        }
    }

    /// Starts writing, signals, then never finishes
    struct HangingTranscoder {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl Transcoder for HangingTranscoder {
        async fn transcode(
            &self,
            request: &TranscodeRequest,
            _backend: EncoderBackend,
        ) -> Result<TranscodeStatus, ShrinkError> {
            tokio::fs::write(&request.output, b"half-written").await?;
            self.started.notify_one();
            std::future::pending::<Result<TranscodeStatus, ShrinkError>>().await
        }
    }

    struct Harness {
        dir: TempDir,
        source: PathBuf,
        backup: PathBuf,
        prober_calls: Arc<AtomicUsize>,
        transcoder_inputs: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let source = dir.path().join("videos");
            let backup = dir.path().join("backup");
            std::fs::create_dir(&source).unwrap();
            Self {
                dir,
                source,
                backup,
                prober_calls: Arc::new(AtomicUsize::new(0)),
                transcoder_inputs: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn write(&self, relative: &str, size: usize) -> PathBuf {
            let path = self.source.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, vec![b'O'; size]).unwrap();
            path
        }

        fn config(&self, source: &Path, backup: &Path) -> Config {
            Config {
                source_dir: source.to_path_buf(),
                backup_dir: backup.to_path_buf(),
                max_size_mb: 1,
                ..Default::default()
            }
        }

        fn compressor_with(&self, config: Config, transcoder: Box<dyn Transcoder>) -> BatchCompressor {
            let prober = FakeProber {
                calls: self.prober_calls.clone(),
            };
            let invoker = EncoderInvoker::new(
                vec![EncoderBackend::Nvenc, EncoderBackend::Software],
                transcoder,
            );
            BatchCompressor::new(config, Box::new(prober), invoker)
                .unwrap()
                .with_output_mode(OutputMode::Silent)
        }

        fn compressor(&self, output_size: usize) -> BatchCompressor {
            let transcoder = FakeTranscoder {
                output_size,
                inputs: self.transcoder_inputs.clone(),
            };
            self.compressor_with(self.config(&self.source, &self.backup), Box::new(transcoder))
        }

        fn temp_artifacts(&self) -> Vec<PathBuf> {
            walkdir::WalkDir::new(self.dir.path())
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.path().to_path_buf())
                .filter(|p| FileManager::is_temp_artifact(p))
                .collect()
        }
    }

    fn never() -> std::future::Pending<()> {
        std::future::pending()
    }

    #[tokio::test]
    async fn test_small_file_is_copied_and_left_in_place() {
        let h = Harness::new();
        let clip = h.write("trip/small.mp4", 1000);

        let report = h.compressor(10).run_until(never()).await.unwrap();

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].outcome, ProcessingOutcome::Skipped { size: 1000 });
        assert_eq!(std::fs::read(&clip).unwrap(), vec![b'O'; 1000]);
        assert_eq!(std::fs::read(h.backup.join("trip/small.mp4")).unwrap(), vec![b'O'; 1000]);
        assert_eq!(h.prober_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_large_file_is_replaced_and_original_backed_up() {
        let h = Harness::new();
        let clip = h.write("trip/day1/big.MOV", 2 * MIB);

        let report = h.compressor(4096).run_until(never()).await.unwrap();

        match &report.entries[0].outcome {
            ProcessingOutcome::Compressed {
                original_size,
                compressed_size,
                backend,
                size_exceeded,
                ..
            } => {
                assert_eq!(*original_size, (2 * MIB) as u64);
                assert_eq!(*compressed_size, 4096);
                assert_eq!(*backend, EncoderBackend::Software);
                assert!(!size_exceeded);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(std::fs::read(&clip).unwrap(), vec![b'E'; 4096]);
        assert_eq!(
            std::fs::read(h.backup.join("trip/day1/big.MOV")).unwrap(),
            vec![b'O'; 2 * MIB]
        );
        assert!(h.temp_artifacts().is_empty());
        assert_eq!(report.stats().total_bytes_saved, (2 * MIB - 4096) as u64);
    }

    #[tokio::test]
    async fn test_probe_failure_leaves_file_untouched() {
        let h = Harness::new();
        let clip = h.write("broken.mp4", 2 * MIB);

        let report = h.compressor(4096).run_until(never()).await.unwrap();

        assert!(matches!(
            report.entries[0].outcome,
            ProcessingOutcome::Failed { kind: "duration-probe-error", .. }
        ));
        assert_eq!(std::fs::read(&clip).unwrap().len(), 2 * MIB);
        assert!(!h.backup.join("broken.mp4").exists());
        assert!(h.transcoder_inputs.lock().unwrap().is_empty());
        assert_eq!(report.exit_code(), EXIT_FILE_FAILURES);
    }

    #[tokio::test]
    async fn test_encode_failure_is_listed_once_and_cleaned_up() {
        let h = Harness::new();
        let clip = h.write("unencodable.mkv", 2 * MIB);
        h.write("fine.mp4", 2 * MIB);

        let report = h.compressor(4096).run_until(never()).await.unwrap();

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path, clip.canonicalize().unwrap());
        assert!(matches!(
            failures[0].outcome,
            ProcessingOutcome::Failed { kind: "encode-error", .. }
        ));

        assert_eq!(std::fs::read(&clip).unwrap(), vec![b'O'; 2 * MIB]);
        assert!(!h.backup.join("unencodable.mkv").exists());
        assert!(h.temp_artifacts().is_empty());
        // The next file is still processed
        assert!(matches!(report.entries[0].outcome, ProcessingOutcome::Compressed { .. }));
    }

    #[tokio::test]
    async fn test_output_over_budget_is_kept_with_warning() {
        let h = Harness::new();
        let clip = h.write("dense.mp4", 3 * MIB);

        let report = h.compressor(MIB + MIB / 2).run_until(never()).await.unwrap();

        assert!(matches!(
            report.entries[0].outcome,
            ProcessingOutcome::Compressed { size_exceeded: true, .. }
        ));
        assert_eq!(std::fs::read(&clip).unwrap().len(), MIB + MIB / 2);
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
    }

    #[tokio::test]
    async fn test_entries_follow_scan_order_and_each_file_is_encoded_once() {
        let h = Harness::new();
        h.write("b/second.mp4", 2 * MIB);
        h.write("a/first.mp4", 10);
        h.write("c.webm", 2 * MIB);
        h.write("readme.txt", 2 * MIB);

        let report = h.compressor(100).run_until(never()).await.unwrap();

        let order: Vec<_> = report.entries.iter().map(|e| e.relative_path.clone()).collect();
        assert_eq!(
            order,
            vec![
                PathBuf::from("a/first.mp4"),
                PathBuf::from("b/second.mp4"),
                PathBuf::from("c.webm")
            ]
        );

        // Nvenc attempt + software attempt per compressed file
        let inputs = h.transcoder_inputs.lock().unwrap();
        assert_eq!(inputs.len(), 4);
        assert!(inputs[0].ends_with("b/second.mp4") && inputs[1].ends_with("b/second.mp4"));
        assert!(inputs[2].ends_with("c.webm") && inputs[3].ends_with("c.webm"));
    }

    #[tokio::test]
    async fn test_rerun_over_backup_tree_skips_everything() {
        let h = Harness::new();
        h.write("x/one.mp4", 100);
        h.write("two.mov", 200);

        let first = h.compressor(10).run_until(never()).await.unwrap();
        assert_eq!(first.stats().files_skipped, 2);

        let second_backup = h.dir.path().join("backup2");
        let transcoder = FakeTranscoder {
            output_size: 10,
            inputs: h.transcoder_inputs.clone(),
        };
        let rerun = h.compressor_with(h.config(&h.backup, &second_backup), Box::new(transcoder));
        let second = rerun.run_until(never()).await.unwrap();

        assert_eq!(second.entries.len(), 2);
        assert!(second
            .entries
            .iter()
            .all(|e| matches!(e.outcome, ProcessingOutcome::Skipped { .. })));
        assert_eq!(std::fs::read(second_backup.join("x/one.mp4")).unwrap(), vec![b'O'; 100]);
    }

    #[tokio::test]
    async fn test_second_run_with_same_backup_keeps_originals() {
        let h = Harness::new();
        let clip = h.write("big.mp4", 2 * MIB);
        h.write("small.mp4", 100);

        let first = h.compressor(4096).run_until(never()).await.unwrap();
        assert_eq!(first.stats().files_compressed, 1);
        assert_eq!(first.stats().files_skipped, 1);

        let second = h.compressor(4096).run_until(never()).await.unwrap();

        // big.mp4 is now small enough, but its backup is the original
        assert!(matches!(
            second.entries[0].outcome,
            ProcessingOutcome::Failed { kind: "backup-conflict", .. }
        ));
        assert_eq!(second.entries[1].outcome, ProcessingOutcome::Skipped { size: 100 });
        assert_eq!(std::fs::read(h.backup.join("big.mp4")).unwrap(), vec![b'O'; 2 * MIB]);
        assert_eq!(std::fs::read(&clip).unwrap(), vec![b'E'; 4096]);
        assert_eq!(std::fs::read(h.backup.join("small.mp4")).unwrap(), vec![b'O'; 100]);
        assert_eq!(second.exit_code(), EXIT_FILE_FAILURES);
    }

    #[tokio::test]
    async fn test_conflicting_backup_stops_file_before_encoding() {
        let h = Harness::new();
        let clip = h.write("big.mp4", 2 * MIB);
        std::fs::create_dir_all(&h.backup).unwrap();
        std::fs::write(h.backup.join("big.mp4"), b"unrelated").unwrap();

        let report = h.compressor(4096).run_until(never()).await.unwrap();

        assert!(matches!(
            report.entries[0].outcome,
            ProcessingOutcome::Failed { kind: "backup-conflict", .. }
        ));
        assert_eq!(h.prober_calls.load(Ordering::SeqCst), 0);
        assert!(h.transcoder_inputs.lock().unwrap().is_empty());
        assert_eq!(std::fs::read(&clip).unwrap(), vec![b'O'; 2 * MIB]);
        assert_eq!(std::fs::read(h.backup.join("big.mp4")).unwrap(), b"unrelated");
        assert!(h.temp_artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_backup_inside_source_is_rejected_before_scanning() {
        let h = Harness::new();
        h.write("big.mp4", 2 * MIB);
        let nested = h.source.join("originals");

        let transcoder = FakeTranscoder {
            output_size: 10,
            inputs: h.transcoder_inputs.clone(),
        };
        let compressor = h.compressor_with(h.config(&h.source, &nested), Box::new(transcoder));
        let err = compressor.run_until(never()).await.unwrap_err();

        let shrink_err = err.downcast_ref::<ShrinkError>().unwrap();
        assert!(matches!(shrink_err, ShrinkError::InvalidDirectory(_)));
        assert!(shrink_err.is_fatal());
        assert!(!nested.exists());
        assert_eq!(h.prober_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interrupt_removes_in_flight_output() {
        let h = Harness::new();
        let first = h.write("a.mp4", 2 * MIB);
        let second = h.write("b.mp4", 2 * MIB);

        let started = Arc::new(Notify::new());
        let compressor = h.compressor_with(
            h.config(&h.source, &h.backup),
            Box::new(HangingTranscoder {
                started: started.clone(),
            }),
        );

        let shutdown = async move { started.notified().await };
        let report = compressor.run_until(shutdown).await.unwrap();

        assert!(report.interrupted);
        assert!(report.entries.is_empty());
        assert_eq!(report.total_files, 2);
        assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
        assert_eq!(std::fs::read(&first).unwrap(), vec![b'O'; 2 * MIB]);
        assert_eq!(std::fs::read(&second).unwrap(), vec![b'O'; 2 * MIB]);
        assert!(h.temp_artifacts().is_empty());
        assert!(!h.backup.exists());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let h = Harness::new();
        let mut config = h.config(&h.source, &h.backup);
        config.safety_factor = 2.0;

        let invoker = EncoderInvoker::new(
            vec![EncoderBackend::Software],
            Box::new(FakeTranscoder {
                output_size: 1,
                inputs: h.transcoder_inputs.clone(),
            }),
        );
        let prober = FakeProber {
            calls: h.prober_calls.clone(),
        };
        let err = BatchCompressor::new(config, Box::new(prober), invoker)
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<ShrinkError>(), Some(ShrinkError::Config(_))));
    }
}
