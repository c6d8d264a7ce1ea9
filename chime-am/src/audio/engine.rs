//! Precise playback engine
//!
//! Couples an [`AudioGraph`] with the output driver that renders it.
//! Engines are built through an [`EngineFactory`] so the manager can try
//! construction once at initialization and fall back to the element backend
//! when it fails.

use crate::audio::decode;
use crate::audio::graph::{AudioGraph, GainNode};
use crate::audio::output::{CpalOutput, NullOutput, OutputDriver};
use crate::audio::types::DecodedClip;
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

/// Sample-accurate engine with a graph clock and a master gain stage
pub struct PreciseEngine {
    graph: Arc<AudioGraph>,
    output: Box<dyn OutputDriver>,
}

impl PreciseEngine {
    pub fn new(graph: Arc<AudioGraph>, output: Box<dyn OutputDriver>) -> Self {
        Self { graph, output }
    }

    pub fn graph(&self) -> &Arc<AudioGraph> {
        &self.graph
    }

    pub fn output_name(&self) -> &str {
        self.output.name()
    }

    pub fn is_running(&self) -> bool {
        self.graph.is_running()
    }

    /// Ask the output to start delivering audio
    pub fn resume(&self) -> Result<()> {
        self.output.resume()
    }

    /// Engine clock in seconds
    pub fn current_time(&self) -> f64 {
        self.graph.current_time()
    }

    pub fn master_gain(&self) -> &GainNode {
        self.graph.master_gain()
    }

    /// Decode fetched bytes into a clip this engine can play.
    ///
    /// CPU-bound; call from a blocking context.
    pub fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedClip> {
        decode::decode_clip(bytes, extension)
    }

    /// Start `clip` at engine time `when` through a fresh gain of `volume`.
    ///
    /// Resolves when the clip has finished rendering.
    pub fn start_clip(&self, clip: Arc<DecodedClip>, volume: f32, when: f64) -> oneshot::Receiver<()> {
        self.graph.start_source(clip, GainNode::new(volume), when)
    }
}

impl std::fmt::Debug for PreciseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreciseEngine")
            .field("output", &self.output.name())
            .field("sample_rate", &self.graph.sample_rate())
            .field("running", &self.graph.is_running())
            .finish()
    }
}

/// Constructs a [`PreciseEngine`].
///
/// `create` may block (device enumeration, thread startup); the manager
/// calls it from a blocking task.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<PreciseEngine>;
}

/// Engine rendering to a cpal output device
#[derive(Debug, Clone, Default)]
pub struct DeviceEngineFactory {
    pub device: Option<String>,
    pub buffer_size: Option<u32>,
}

impl EngineFactory for DeviceEngineFactory {
    fn create(&self) -> Result<PreciseEngine> {
        let (output, graph) = CpalOutput::open(self.device.clone(), self.buffer_size)?;
        info!(
            "Precise engine on {} at {} Hz",
            output.name(),
            graph.sample_rate()
        );
        Ok(PreciseEngine::new(graph, Box::new(output)))
    }
}

/// Engine rendering to a real-time null output
#[derive(Debug, Clone)]
pub struct HeadlessEngineFactory {
    pub sample_rate: u32,
}

impl Default for HeadlessEngineFactory {
    fn default() -> Self {
        Self { sample_rate: 48_000 }
    }
}

impl EngineFactory for HeadlessEngineFactory {
    fn create(&self) -> Result<PreciseEngine> {
        let graph = Arc::new(AudioGraph::new(self.sample_rate));
        let output = NullOutput::start(Arc::clone(&graph))?;
        info!("Precise engine on null output at {} Hz", self.sample_rate);
        Ok(PreciseEngine::new(graph, Box::new(output)))
    }
}
