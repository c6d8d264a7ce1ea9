//! Audio subsystem
//!
//! Decoding, the sample-accurate mixing graph with its output drivers, and
//! the media elements used when no precise engine is available.

pub mod decode;
pub mod element;
pub mod engine;
pub mod graph;
pub mod output;
pub mod types;

pub use element::{CommandElement, CommandElementLoader, ElementEvent, ElementLoader, MediaElement};
pub use engine::{DeviceEngineFactory, EngineFactory, HeadlessEngineFactory, PreciseEngine};
pub use graph::{AudioGraph, GainNode};
pub use output::{CpalOutput, NullOutput, OutputDriver};
pub use types::DecodedClip;
