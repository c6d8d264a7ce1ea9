//! Global volume and mute
//!
//! Effective gain:
//! - precise backend: `muted ? 0 : volume` on the master gain node, with
//!   per-play volume on each source's own gain
//! - element backend: `muted ? 0 : volume * per_play` applied to the
//!   element at play time only

use crate::audio::graph::GainNode;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct GainValues {
    volume: f32,
    muted: bool,
}

impl GainValues {
    fn effective(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

/// Volume/mute state, mirrored onto the precise master gain once attached
#[derive(Debug)]
pub struct GainState {
    values: Mutex<GainValues>,
    master: OnceLock<GainNode>,
}

impl GainState {
    pub fn new(volume: f32, muted: bool) -> Self {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            values: Mutex::new(GainValues { volume, muted }),
            master: OnceLock::new(),
        }
    }

    /// Link the precise engine's master gain and push the current value
    pub fn attach_master(&self, master: GainNode) {
        let values = self.lock_values();
        master.set(values.effective());
        if self.master.set(master).is_err() {
            debug!("Master gain already attached");
        }
    }

    /// Set the global volume, clamped to [0, 1]. Non-finite values are ignored.
    ///
    /// Returns the volume now in effect.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let mut values = self.lock_values();
        if !volume.is_finite() {
            warn!("Ignoring non-finite volume {}", volume);
            return values.volume;
        }
        values.volume = volume.clamp(0.0, 1.0);
        self.push(&values);
        values.volume
    }

    pub fn set_muted(&self, muted: bool) {
        let mut values = self.lock_values();
        values.muted = muted;
        self.push(&values);
    }

    pub fn volume(&self) -> f32 {
        self.lock_values().volume
    }

    pub fn is_muted(&self) -> bool {
        self.lock_values().muted
    }

    /// Master gain value for the precise backend
    pub fn effective_master(&self) -> f32 {
        self.lock_values().effective()
    }

    /// Element volume for a play with the given per-play volume
    pub fn effective_element(&self, per_play: f32) -> f32 {
        self.lock_values().effective() * sanitize_per_play(per_play)
    }

    fn push(&self, values: &GainValues) {
        if let Some(master) = self.master.get() {
            master.set(values.effective());
        }
    }

    fn lock_values(&self) -> MutexGuard<'_, GainValues> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for GainState {
    fn default() -> Self {
        Self::new(1.0, false)
    }
}

/// Per-play volume clamped to [0, 1]; non-finite values play at full volume
pub fn sanitize_per_play(volume: f32) -> f32 {
    if volume.is_finite() {
        volume.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_gain_formulas() {
        let gain = GainState::new(0.8, false);
        assert!((gain.effective_master() - 0.8).abs() < 1e-6);
        assert!((gain.effective_element(0.5) - 0.4).abs() < 1e-6);

        gain.set_muted(true);
        assert_eq!(gain.effective_master(), 0.0);
        assert_eq!(gain.effective_element(0.5), 0.0);
        assert!((gain.volume() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_volume_clamped() {
        let gain = GainState::default();
        assert_eq!(gain.set_volume(1.7), 1.0);
        assert_eq!(gain.set_volume(-0.2), 0.0);
    }

    #[test]
    fn test_nan_volume_ignored() {
        let gain = GainState::new(0.6, false);
        assert!((gain.set_volume(f32::NAN) - 0.6).abs() < 1e-6);
        assert!((gain.volume() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_master_mirrors_changes() {
        let gain = GainState::new(0.5, false);
        let master = GainNode::new(1.0);
        gain.attach_master(master.clone());
        assert_eq!(master.value(), 0.5);

        gain.set_muted(true);
        assert_eq!(master.value(), 0.0);

        gain.set_volume(0.25);
        assert_eq!(master.value(), 0.0);

        gain.set_muted(false);
        assert_eq!(master.value(), 0.25);
    }

    #[test]
    fn test_per_play_sanitized() {
        assert_eq!(sanitize_per_play(3.0), 1.0);
        assert_eq!(sanitize_per_play(-1.0), 0.0);
        assert_eq!(sanitize_per_play(f32::INFINITY), 1.0);
        assert_eq!(sanitize_per_play(0.3), 0.3);
    }
}
