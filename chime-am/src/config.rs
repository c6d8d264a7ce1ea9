//! Configuration for the chime audio manager
//!
//! Loaded from TOML (see `chime_common::config` for file discovery). Every
//! field has a built-in default, so an empty or missing file yields a
//! working configuration.
//!
//! ```toml
//! [playback]
//! pool_size = 3
//! volume = 0.8
//! backend = "auto"        # auto | fallback | headless
//!
//! [scheduler]
//! coarse_threshold_ms = 50
//! coarse_margin_ms = 40
//! fine_step_ms = 10
//!
//! [fetch]
//! timeout_ms = 10000
//! base_dir = "/usr/share/chime/clips"
//!
//! [fallback]
//! player = ["paplay", "--volume={volume_pa}", "{path}"]
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level manager configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    pub playback: PlaybackConfig,
    pub scheduler: SchedulerConfig,
    pub fetch: FetchConfig,
    pub fallback: FallbackConfig,
    pub logging: LoggingConfig,
}

/// Which playback backend the manager should try at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Try the device-backed precise engine, fall back to elements on failure
    #[default]
    Auto,
    /// Never construct the precise engine
    Fallback,
    /// Precise engine rendering to a null output (no device)
    Headless,
}

impl std::str::FromStr for BackendPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "fallback" => Ok(Self::Fallback),
            "headless" => Ok(Self::Headless),
            other => Err(Error::Config(format!(
                "Unknown backend '{}', expected auto, fallback or headless",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pooled element clones per identifier (fallback backend)
    pub pool_size: usize,
    /// Initial global volume, clamped to [0, 1]
    pub volume: f32,
    /// Initial mute state
    pub muted: bool,
    pub backend: BackendPreference,
    /// Output device name (None = default device)
    pub device: Option<String>,
    /// Output buffer size in frames (None = device default)
    pub buffer_size: Option<u32>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            pool_size: 3,
            volume: 1.0,
            muted: false,
            backend: BackendPreference::Auto,
            device: None,
            buffer_size: None,
        }
    }
}

/// Adaptive polling thresholds for fallback scheduling
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Above this remaining time the corrector polls coarsely
    pub coarse_threshold_ms: u64,
    /// Coarse sleeps stop this far ahead of the target
    pub coarse_margin_ms: u64,
    /// Maximum sleep once inside the coarse threshold
    pub fine_step_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            coarse_threshold_ms: 50,
            coarse_margin_ms: 40,
            fine_step_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
    /// Root for relative identifiers (None = current directory)
    pub base_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: concat!("chime/", env!("CARGO_PKG_VERSION")).to_string(),
            base_dir: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        chime_common::time::millis_to_duration(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Argv template for the system player
    ///
    /// Placeholders: `{path}`, `{volume}` (0.0-1.0), `{volume_pct}` (0-100),
    /// `{volume_pa}` (0-65536, PulseAudio scale).
    pub player: Vec<String>,
    /// Directory for spilled clip bytes (None = platform cache dir)
    pub cache_dir: Option<PathBuf>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            player: default_player_command(),
            cache_dir: None,
        }
    }
}

impl FallbackConfig {
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| chime_common::config::default_cache_dir().join("clips"))
    }
}

/// Platform default system player invocation
fn default_player_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["afplay", "-v", "{volume}", "{path}"]
    } else if cfg!(target_os = "windows") {
        &[
            "powershell",
            "-NoProfile",
            "-Command",
            "(New-Object Media.SoundPlayer '{path}').PlaySync()",
        ]
    } else {
        &["paplay", "--volume={volume_pa}", "{path}"]
    };
    argv.iter().map(|s| s.to_string()).collect()
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from an optional TOML file, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = chime_common::config::load_toml_or_default(path)?;
        config.validate()
    }

    /// Parse configuration from TOML text, then validate
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = chime_common::config::parse_toml(content)?;
        config.validate()
    }

    /// Check invariants and normalize values
    pub fn validate(mut self) -> Result<Self> {
        chime_common::config::require_at_least(
            "playback.pool_size",
            self.playback.pool_size as u64,
            1,
        )?;
        chime_common::config::require_at_least(
            "scheduler.fine_step_ms",
            self.scheduler.fine_step_ms,
            1,
        )?;
        if self.scheduler.coarse_margin_ms >= self.scheduler.coarse_threshold_ms {
            return Err(Error::Config(format!(
                "scheduler.coarse_margin_ms ({}) must be below scheduler.coarse_threshold_ms ({})",
                self.scheduler.coarse_margin_ms, self.scheduler.coarse_threshold_ms
            )));
        }
        if self.fallback.player.is_empty() {
            return Err(Error::Config("fallback.player must not be empty".to_string()));
        }

        self.playback.volume = if self.playback.volume.is_finite() {
            self.playback.volume.clamp(0.0, 1.0)
        } else {
            1.0
        };

        Ok(self)
    }
}
