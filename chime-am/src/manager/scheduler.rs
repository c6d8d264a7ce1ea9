//! Drift-corrected waiting for scheduled element playback
//!
//! Media elements cannot be started at a future instant, so scheduled plays
//! on the element backend wait with adaptive polling: coarse sleeps while
//! the target is far away, ending a margin before the threshold, then short
//! fine steps until the target is reached. This keeps timer overshoot small
//! without busy-waiting.

use crate::config::SchedulerConfig;
use chime_common::time::millis_to_duration;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// What the corrector does next for a given remaining time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Far from the target: sleep this long
    Coarse(Duration),
    /// Close to the target: sleep this long
    Fine(Duration),
    /// Target reached: start playback now
    Fire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollThresholds {
    pub coarse_threshold: Duration,
    pub coarse_margin: Duration,
    pub fine_step: Duration,
}

impl From<SchedulerConfig> for PollThresholds {
    fn from(config: SchedulerConfig) -> Self {
        Self {
            coarse_threshold: millis_to_duration(config.coarse_threshold_ms),
            coarse_margin: millis_to_duration(config.coarse_margin_ms),
            fine_step: millis_to_duration(config.fine_step_ms),
        }
    }
}

impl Default for PollThresholds {
    fn default() -> Self {
        SchedulerConfig::default().into()
    }
}

/// Shortest sleep ever requested while the target is still ahead
const MIN_STEP: Duration = Duration::from_millis(1);

impl PollThresholds {
    /// Never yields a zero-length sleep while `remaining` is non-zero, even
    /// for thresholds that failed validation.
    pub fn next_phase(&self, remaining: Duration) -> PollPhase {
        if remaining.is_zero() {
            return PollPhase::Fire;
        }
        if remaining > self.coarse_threshold {
            let coarse = self
                .coarse_threshold
                .min(remaining.saturating_sub(self.coarse_margin));
            if !coarse.is_zero() {
                return PollPhase::Coarse(coarse);
            }
        }
        PollPhase::Fine(self.fine_step.max(MIN_STEP).min(remaining))
    }
}

/// Outcome of one scheduled wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireReport {
    /// Sleeps taken before firing
    pub polls: u32,
    /// How far past the target the corrector fired
    pub lateness: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriftCorrector {
    thresholds: PollThresholds,
}

impl DriftCorrector {
    pub fn new(thresholds: PollThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> PollThresholds {
        self.thresholds
    }

    /// Sleep until `target`, re-measuring the remaining time after every wakeup
    pub async fn wait_until(&self, target: Instant) -> FireReport {
        let mut polls = 0u32;
        loop {
            let now = Instant::now();
            match self.thresholds.next_phase(target.saturating_duration_since(now)) {
                PollPhase::Fire => {
                    let lateness = now.saturating_duration_since(target);
                    debug!("Firing after {} polls, {:?} late", polls, lateness);
                    return FireReport { polls, lateness };
                }
                PollPhase::Coarse(step) | PollPhase::Fine(step) => {
                    trace!("Sleeping {:?} before scheduled play", step);
                    polls += 1;
                    tokio::time::sleep(step).await;
                }
            }
        }
    }
}
