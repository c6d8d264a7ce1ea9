//! Core audio data types

use std::time::Duration;

/// A fully decoded sound clip held in RAM.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Stereo interleaved: [L, R, L, R, ...]
/// - Native sample rate of the source file (no resampling at decode time)
#[derive(Debug, Clone)]
pub struct DecodedClip {
    /// PCM audio samples (interleaved stereo)
    pub samples: Vec<f32>,

    /// Native sample rate in Hz
    pub sample_rate: u32,

    /// Number of stereo frames (samples.len() / 2)
    pub frames: usize,
}

impl DecodedClip {
    /// Create a clip from interleaved stereo samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let frames = samples.len() / 2;
        Self {
            samples,
            sample_rate,
            frames,
        }
    }

    /// Playback length at the native rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate as f64)
    }

    /// Get the stereo frame at an exact index
    pub fn frame(&self, index: usize) -> Option<(f32, f32)> {
        if index >= self.frames {
            return None;
        }
        Some((self.samples[index * 2], self.samples[index * 2 + 1]))
    }

    /// Stereo frame at a fractional position using linear interpolation.
    ///
    /// Returns `None` once `position` is past the last frame.
    pub fn sample_at(&self, position: f64) -> Option<(f32, f32)> {
        if position < 0.0 {
            return None;
        }
        let index = position.floor() as usize;
        let (left, right) = self.frame(index)?;

        let next = match self.frame(index + 1) {
            Some(next) => next,
            None => return Some((left, right)),
        };

        let fraction = (position - position.floor()) as f32;
        Some((
            left + (next.0 - left) * fraction,
            right + (next.1 - right) * fraction,
        ))
    }
}
