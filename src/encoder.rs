//! # Video Encoding Module
//!
//! Questo modulo gestisce la ricodifica dei video tramite FFmpeg con fallback tra backend.
//!
//! ## Responsabilità:
//! - Definisce i backend di encoding (NVENC, QSV, VideoToolbox, AMF, VAAPI, software)
//! - Costruisce la command line FFmpeg a partire da un `BitratePlan`
//! - Prova i backend in ordine di priorità (hardware prima, libx264 per ultimo)
//! - Pulisce sempre l'output parziale prima di un nuovo tentativo o dopo il fallimento
//!
//! ## Pipeline di encoding:
//! 1. Per ogni backend nella lista di preferenza:
//!    - Lancia FFmpeg con bitrate video/audio/buffer in kbps
//!    - Successo = exit status zero + file di output non vuoto
//!    - Fallimento = rimuove l'output parziale e passa al backend successivo
//! 2. Se tutti i backend falliscono ritorna `ShrinkError::Encode`
//!
//! ## Formato di output:
//! - Container MP4 con flag `+faststart` (layout streamable)
//! - Video H.264 (encoder scelto dal backend), audio AAC
//! - Solo il primo stream video e gli stream audio vengono mappati
//!
//! ## Esempio:
//! ```ignore
//! let invoker = EncoderInvoker::new(backends, Box::new(FfmpegTranscoder::new(None)));
//! let encoded = invoker.encode(&input, &temp_output, &plan).await?;
//! ```

use crate::args;
use crate::bitrate::BitratePlan;
use crate::error::ShrinkError;
use crate::platform::PlatformCommands;
use crate::utils::{display_name, kbps_arg};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Number of stderr lines kept from a failed attempt
const STDERR_TAIL_LINES: usize = 6;

/// A specific encoder implementation able to perform the transcode step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderBackend {
    /// NVIDIA NVENC
    Nvenc,
    /// Intel Quick Sync
    Qsv,
    /// Apple VideoToolbox
    VideoToolbox,
    /// AMD AMF
    Amf,
    /// Video Acceleration API (Linux)
    Vaapi,
    /// libx264
    Software,
}

impl EncoderBackend {
    /// Every backend, hardware variants first
    pub const ALL: [EncoderBackend; 6] = [
        Self::Nvenc,
        Self::Qsv,
        Self::VideoToolbox,
        Self::Amf,
        Self::Vaapi,
        Self::Software,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Nvenc => "nvenc",
            Self::Qsv => "qsv",
            Self::VideoToolbox => "videotoolbox",
            Self::Amf => "amf",
            Self::Vaapi => "vaapi",
            Self::Software => "software",
        }
    }

    /// Encoder name as listed by `ffmpeg -encoders`
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            Self::Nvenc => "h264_nvenc",
            Self::Qsv => "h264_qsv",
            Self::VideoToolbox => "h264_videotoolbox",
            Self::Amf => "h264_amf",
            Self::Vaapi => "h264_vaapi",
            Self::Software => "libx264",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Software)
    }

    /// Arguments that must precede `-i`
    fn input_args(&self) -> Vec<String> {
        match self {
            Self::Vaapi => args!["-vaapi_device", "/dev/dri/renderD128"],
            _ => Vec::new(),
        }
    }

    /// Codec selection and tuning for the video stream
    fn codec_args(&self) -> Vec<String> {
        let mut codec = args!["-c:v", self.ffmpeg_encoder()];
        let tuning = match self {
            Self::Nvenc => args!["-preset", "p5", "-rc", "vbr"],
            Self::Qsv => args!["-preset", "medium"],
            Self::VideoToolbox => args!["-allow_sw", "0"],
            Self::Amf => args!["-quality", "balanced"],
            Self::Vaapi => args!["-vf", "format=nv12,hwupload"],
            Self::Software => args!["-preset", "medium", "-pix_fmt", "yuv420p"],
        };
        codec.extend(tuning);
        codec
    }
}

impl fmt::Display for EncoderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EncoderBackend {
    type Err = ShrinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|backend| backend.id() == wanted || backend.ffmpeg_encoder() == wanted)
            .ok_or_else(|| {
                ShrinkError::Config(format!(
                    "unknown encoder backend '{}' (expected one of: {})",
                    s,
                    Self::ALL.iter().map(|b| b.id()).collect::<Vec<_>>().join(", ")
                ))
            })
    }
}

/// Rates and paths for one transcode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub video_kbps: u64,
    pub audio_kbps: u64,
    pub buffer_kbps: u64,
}

impl TranscodeRequest {
    pub fn new(input: &Path, output: &Path, plan: &BitratePlan) -> Self {
        Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            video_kbps: plan.video_kbps(),
            audio_kbps: plan.audio_kbps(),
            buffer_kbps: plan.buffer_kbps(),
        }
    }
}

/// Exit status of the external transcoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeStatus {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Last lines of the transcoder's diagnostic output
    pub stderr_tail: String,
}

impl TranscodeStatus {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stderr_tail: String::new(),
        }
    }

    pub fn failed(exit_code: Option<i32>, stderr_tail: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            stderr_tail: stderr_tail.into(),
        }
    }
}

/// External transcoder collaborator
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run one transcode attempt with the given backend.
    ///
    /// `Err` means the attempt could not be run at all (spawn failure,
    /// timeout); a non-zero exit is reported through `TranscodeStatus`.
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        backend: EncoderBackend,
    ) -> Result<TranscodeStatus, ShrinkError>;
}

/// Transcoder backed by the ffmpeg binary
pub struct FfmpegTranscoder {
    timeout: Option<Duration>,
}

impl FfmpegTranscoder {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Full ffmpeg argument list for a request
    pub fn build_args(request: &TranscodeRequest, backend: EncoderBackend) -> Vec<String> {
        let mut cmd_args = args!["-y", "-hide_banner", "-nostdin", "-loglevel", "error"];
        cmd_args.extend(backend.input_args());
        cmd_args.extend(args!["-i", request.input.to_string_lossy()]);
        cmd_args.extend(args!["-map", "0:v:0", "-map", "0:a?"]);
        cmd_args.extend(backend.codec_args());
        cmd_args.extend(args![
            "-b:v",
            kbps_arg(request.video_kbps),
            "-maxrate",
            kbps_arg(request.video_kbps),
            "-bufsize",
            kbps_arg(request.buffer_kbps),
            "-c:a",
            "aac",
            "-b:a",
            kbps_arg(request.audio_kbps),
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
            request.output.to_string_lossy(),
        ]);
        cmd_args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        request: &TranscodeRequest,
        backend: EncoderBackend,
    ) -> Result<TranscodeStatus, ShrinkError> {
        let platform = PlatformCommands::instance();
        let mut cmd = tokio::process::Command::new(platform.get_command("ffmpeg"));
        cmd.args(Self::build_args(request, backend))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("ffmpeg {:?}", Self::build_args(request, backend));

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    ShrinkError::Encode(format!("{} attempt timed out after {:?}", backend, limit))
                })?,
            None => cmd.output().await,
        }
        .map_err(|e| ShrinkError::Encode(format!("failed to execute ffmpeg: {}", e)))?;

        if output.status.success() {
            Ok(TranscodeStatus::succeeded())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Ok(TranscodeStatus::failed(output.status.code(), stderr_tail(&stderr)))
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Result of a successful encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedOutput {
    pub backend: EncoderBackend,
    pub size_bytes: u64,
    /// Backends that failed before the successful one, with their reason
    pub failed_attempts: Vec<(EncoderBackend, String)>,
}

/// Tries encoder backends in priority order until one produces output
pub struct EncoderInvoker {
    backends: Vec<EncoderBackend>,
    transcoder: Box<dyn Transcoder>,
}

impl EncoderInvoker {
    pub fn new(backends: Vec<EncoderBackend>, transcoder: Box<dyn Transcoder>) -> Self {
        Self {
            backends,
            transcoder,
        }
    }

    pub fn backends(&self) -> &[EncoderBackend] {
        &self.backends
    }

    /// Encode `input` into `output` following `plan`.
    ///
    /// On error no file is left at `output`.
    pub async fn encode(
        &self,
        input: &Path,
        output: &Path,
        plan: &BitratePlan,
    ) -> Result<EncodedOutput, ShrinkError> {
        if self.backends.is_empty() {
            return Err(ShrinkError::Encode("no encoder backends configured".to_string()));
        }

        let request = TranscodeRequest::new(input, output, plan);
        let mut failed_attempts = Vec::new();

        for &backend in &self.backends {
            let start_time = Instant::now();
            debug!(
                "Encoding {} with {} (video {}k, audio {}k, buffer {}k)",
                display_name(input),
                backend,
                request.video_kbps,
                request.audio_kbps,
                request.buffer_kbps
            );

            let reason = match self.transcoder.transcode(&request, backend).await {
                Ok(status) if status.success => match output_size(output).await {
                    Some(size_bytes) if size_bytes > 0 => {
                        info!(
                            "Encoded {} with {} in {:.1}s",
                            display_name(input),
                            backend,
                            start_time.elapsed().as_secs_f64()
                        );
                        return Ok(EncodedOutput {
                            backend,
                            size_bytes,
                            failed_attempts,
                        });
                    }
                    Some(_) => "encoder produced an empty file".to_string(),
                    None => "encoder produced no output file".to_string(),
                },
                Ok(status) => match status.exit_code {
                    Some(code) => format!("exit code {}: {}", code, status.stderr_tail),
                    None => format!("terminated by signal: {}", status.stderr_tail),
                },
                Err(e) => e.to_string(),
            };

            warn!("{} encoder failed for {}: {}", backend, display_name(input), reason);
            remove_partial_output(output).await;
            failed_attempts.push((backend, reason));
        }

        let summary = failed_attempts
            .iter()
            .map(|(backend, reason)| format!("{}: {}", backend, reason))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ShrinkError::Encode(format!("all encoder backends failed ({})", summary)))
    }
}

async fn output_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

/// Delete whatever an attempt left at `path`
pub async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted transcoder: each backend either writes output or fails
    struct ScriptedTranscoder {
        working: Vec<EncoderBackend>,
        write_garbage_on_failure: bool,
        calls: Mutex<Vec<EncoderBackend>>,
    }

    impl ScriptedTranscoder {
        fn new(working: Vec<EncoderBackend>) -> Self {
            Self {
                working,
                write_garbage_on_failure: true,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transcoder for ScriptedTranscoder {
        async fn transcode(
            &self,
            request: &TranscodeRequest,
            backend: EncoderBackend,
        ) -> Result<TranscodeStatus, ShrinkError> {
            self.calls.lock().unwrap().push(backend);
            assert!(!request.output.exists(), "partial output survived a failed attempt");

            if self.working.contains(&backend) {
                tokio::fs::write(&request.output, b"encoded").await?;
                Ok(TranscodeStatus::succeeded())
            } else {
                if self.write_garbage_on_failure {
                    tokio::fs::write(&request.output, b"partial").await?;
                }
                Ok(TranscodeStatus::failed(Some(1), "No NVENC capable devices found"))
            }
        }
    }

    fn test_plan() -> BitratePlan {
        BitratePlan {
            video_bitrate_bps: 420_500,
            audio_bitrate_bps: 128_000,
            buffer_size_bps: 841_000,
            floor_reached: false,
        }
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("nvenc".parse::<EncoderBackend>().unwrap(), EncoderBackend::Nvenc);
        assert_eq!("LIBX264".parse::<EncoderBackend>().unwrap(), EncoderBackend::Software);
        assert_eq!(
            "videotoolbox".parse::<EncoderBackend>().unwrap(),
            EncoderBackend::VideoToolbox
        );
        assert!("quantum".parse::<EncoderBackend>().is_err());
    }

    #[test]
    fn test_backend_serde_uses_ids() {
        let json = serde_json::to_string(&EncoderBackend::VideoToolbox).unwrap();
        assert_eq!(json, "\"videotoolbox\"");
        for backend in EncoderBackend::ALL {
            let parsed: EncoderBackend =
                serde_json::from_str(&format!("\"{}\"", backend.id())).unwrap();
            assert_eq!(parsed, backend);
        }
    }

    #[test]
    fn test_build_args_software() {
        let request = TranscodeRequest::new(
            Path::new("/in/clip.mov"),
            Path::new("/in/.clip.shrinking.mp4"),
            &test_plan(),
        );
        let cmd_args = FfmpegTranscoder::build_args(&request, EncoderBackend::Software);
        let joined = cmd_args.join(" ");

        assert!(joined.starts_with("-y -hide_banner"));
        assert!(joined.contains("-i /in/clip.mov"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 420k -maxrate 420k -bufsize 841k"));
        assert!(joined.contains("-c:a aac -b:a 128k"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(cmd_args.last().unwrap(), "/in/.clip.shrinking.mp4");
    }

    #[test]
    fn test_build_args_vaapi_device_precedes_input() {
        let request = TranscodeRequest::new(Path::new("a.mkv"), Path::new("b.mp4"), &test_plan());
        let cmd_args = FfmpegTranscoder::build_args(&request, EncoderBackend::Vaapi);

        let device = cmd_args.iter().position(|a| a == "-vaapi_device").unwrap();
        let input = cmd_args.iter().position(|a| a == "-i").unwrap();
        assert!(device < input);
        assert!(cmd_args.contains(&"h264_vaapi".to_string()));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = (1..=10).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 5"));
        assert!(tail.ends_with("line 10"));
    }

    #[tokio::test]
    async fn test_hardware_failure_falls_back_to_software() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");
        let invoker = EncoderInvoker::new(
            vec![EncoderBackend::Nvenc, EncoderBackend::Qsv, EncoderBackend::Software],
            Box::new(ScriptedTranscoder::new(vec![EncoderBackend::Software])),
        );

        let encoded = invoker
            .encode(Path::new("in.mp4"), &output, &test_plan())
            .await
            .unwrap();

        assert_eq!(encoded.backend, EncoderBackend::Software);
        assert_eq!(encoded.size_bytes, 7);
        assert_eq!(encoded.failed_attempts.len(), 2);
        assert_eq!(std::fs::read(&output).unwrap(), b"encoded");
    }

    #[tokio::test]
    async fn test_first_working_backend_stops_the_chain() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");
        let transcoder = ScriptedTranscoder::new(vec![EncoderBackend::Nvenc, EncoderBackend::Software]);
        let invoker = EncoderInvoker::new(
            vec![EncoderBackend::Nvenc, EncoderBackend::Software],
            Box::new(transcoder),
        );

        let encoded = invoker.encode(Path::new("in.mp4"), &output, &test_plan()).await.unwrap();
        assert_eq!(encoded.backend, EncoderBackend::Nvenc);
        assert!(encoded.failed_attempts.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_backends_leave_no_artifact() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");
        let invoker = EncoderInvoker::new(
            vec![EncoderBackend::Nvenc, EncoderBackend::Software],
            Box::new(ScriptedTranscoder::new(vec![])),
        );

        let err = invoker
            .encode(Path::new("in.mp4"), &output, &test_plan())
            .await
            .unwrap_err();

        assert!(matches!(err, ShrinkError::Encode(ref msg) if msg.contains("nvenc") && msg.contains("software")));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_empty_output_counts_as_failure() {
        struct EmptyOutput;

        #[async_trait]
        impl Transcoder for EmptyOutput {
            async fn transcode(
                &self,
                request: &TranscodeRequest,
                _backend: EncoderBackend,
            ) -> Result<TranscodeStatus, ShrinkError> {
                tokio::fs::write(&request.output, b"").await?;
                Ok(TranscodeStatus::succeeded())
            }
        }

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");
        let invoker = EncoderInvoker::new(vec![EncoderBackend::Software], Box::new(EmptyOutput));

        assert!(invoker.encode(Path::new("in.mp4"), &output, &test_plan()).await.is_err());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_no_backends_is_an_encode_error() {
        let invoker = EncoderInvoker::new(vec![], Box::new(ScriptedTranscoder::new(vec![])));
        let err = invoker
            .encode(Path::new("in.mp4"), Path::new("out.mp4"), &test_plan())
            .await
            .unwrap_err();
        assert!(matches!(err, ShrinkError::Encode(_)));
    }
}
