//! # Chime Audio Manager Library (chime-am)
//!
//! Loads, caches and plays short audio clips with precise timing.
//!
//! **Purpose:** Fetch clips by identifier (path or URL), keep them loaded,
//! and play them immediately, after a delay, or as a gapless-as-possible
//! sequence, with global volume and mute.
//!
//! **Architecture:** A sample-accurate engine (symphonia + cpal) when an
//! output can be opened, otherwise pooled system-player processes with
//! drift-corrected scheduling.

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod manager;

pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use events::{ManagerEvent, PlaybackOutcome};
pub use manager::backend::BackendKind;
pub use manager::cache::{LoadState, ResourceHandle};
pub use manager::{PlayOptions, SequenceEntry, SoundManager, SoundManagerBuilder};
