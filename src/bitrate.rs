//! # Bitrate Planning Module
//!
//! Questo modulo calcola i bitrate target per far stare un video nel budget di dimensione.
//!
//! ## Responsabilità:
//! - Definisce `SizeBudget` (dimensione massima + margine di sicurezza)
//! - Calcola `BitratePlan` a partire da durata e budget
//! - Segnala quando il bitrate video scende al minimo (output probabilmente oltre il target)
//!
//! ## Algoritmo:
//! 1. `bit_disponibili = target_bytes * 8`
//! 2. `bitrate_massimo = bit_disponibili / durata`
//! 3. Se `bitrate_massimo <= audio + video_minimo`: video = video_minimo (warning)
//! 4. Altrimenti: video = max(bitrate_massimo - audio, video_minimo)
//! 5. `buffer = 2 * video` (finestra di rate control di due secondi)
//!
//! Tutti i valori passati all'encoder sono arrotondati per difetto al kilobit intero.
//!
//! ## Esempio:
//! ```ignore
//! let budget = SizeBudget::from_megabytes(10, 0.95);
//! let plan = plan(143.2, budget.target_bytes, 128_000, 200_000)?;
//! assert_eq!(plan.video_kbps(), 428);
//! ```

use crate::error::ShrinkError;
use serde::Serialize;

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Byte ceiling for compressed output, with the safety margin applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeBudget {
    /// Files at or below this size are never re-encoded
    pub max_bytes: u64,
    /// Size the planner aims for (`max_bytes * safety_factor`)
    pub target_bytes: u64,
}

impl SizeBudget {
    pub fn new(max_bytes: u64, safety_factor: f64) -> Self {
        Self {
            max_bytes,
            target_bytes: (max_bytes as f64 * safety_factor) as u64,
        }
    }

    pub fn from_megabytes(max_megabytes: u64, safety_factor: f64) -> Self {
        Self::new(max_megabytes * BYTES_PER_MEGABYTE, safety_factor)
    }

    /// Whether a file of this size must be compressed
    pub fn exceeds(&self, size_bytes: u64) -> bool {
        size_bytes > self.max_bytes
    }
}

/// Video/audio rates computed to hit the size budget for one clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitratePlan {
    pub video_bitrate_bps: u64,
    pub audio_bitrate_bps: u64,
    pub buffer_size_bps: u64,
    /// Video bitrate was clamped to the configured minimum
    pub floor_reached: bool,
}

impl BitratePlan {
    pub fn video_kbps(&self) -> u64 {
        self.video_bitrate_bps / 1000
    }

    pub fn audio_kbps(&self) -> u64 {
        self.audio_bitrate_bps / 1000
    }

    pub fn buffer_kbps(&self) -> u64 {
        self.buffer_size_bps / 1000
    }

    /// Expected output size for a clip of the given duration
    pub fn estimated_output_bytes(&self, duration_seconds: f64) -> u64 {
        let total_bps = (self.video_kbps() + self.audio_kbps()) * 1000;
        (total_bps as f64 * duration_seconds / 8.0) as u64
    }
}

/// Compute the bitrate plan for a clip.
///
/// Never returns a video bitrate below `min_video_bitrate_bps`; when the
/// budget cannot carry both streams at minimum quality the plan is marked
/// with `floor_reached` and the caller is expected to warn.
pub fn plan(
    duration_seconds: f64,
    target_bytes: u64,
    audio_bitrate_bps: u64,
    min_video_bitrate_bps: u64,
) -> Result<BitratePlan, ShrinkError> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(ShrinkError::InvalidInput(format!(
            "duration must be a positive number of seconds, got {}",
            duration_seconds
        )));
    }

    let total_bits_available = target_bytes as f64 * 8.0;
    let max_combined_bitrate = total_bits_available / duration_seconds;
    let floor = (audio_bitrate_bps + min_video_bitrate_bps) as f64;

    let (video_bitrate_bps, floor_reached) = if max_combined_bitrate <= floor {
        (min_video_bitrate_bps, true)
    } else {
        let available = (max_combined_bitrate - audio_bitrate_bps as f64) as u64;
        if available < min_video_bitrate_bps {
            (min_video_bitrate_bps, true)
        } else {
            (available, false)
        }
    };

    Ok(BitratePlan {
        video_bitrate_bps,
        audio_bitrate_bps,
        buffer_size_bps: video_bitrate_bps * 2,
        floor_reached,
    })
}
