//! Sample-accurate mixing graph for the precise backend
//!
//! The graph owns the engine clock: `current_time()` is the number of frames
//! rendered so far divided by the output sample rate. Sources are started at
//! an absolute engine time and are mixed through a per-source gain and the
//! shared master gain. A suspended graph renders silence and its clock does
//! not advance.
//!
//! `render` is called from the audio output thread (cpal callback or the
//! null output loop); everything else may be called from any thread.

use crate::audio::types::DecodedClip;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::trace;

/// Shared gain parameter.
///
/// Cloning yields another handle to the same value, so the audio thread sees
/// updates without locking.
#[derive(Debug, Clone)]
pub struct GainNode {
    bits: Arc<AtomicU32>,
}

impl GainNode {
    pub fn new(value: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(sanitize_gain(value).to_bits())),
        }
    }

    pub fn set(&self, value: f32) {
        self.bits
            .store(sanitize_gain(value).to_bits(), Ordering::Relaxed);
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

fn sanitize_gain(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// One scheduled playback of a clip
struct Source {
    clip: Arc<DecodedClip>,
    gain: GainNode,
    /// Absolute output frame at which the first clip frame is emitted
    start_frame: u64,
    /// Read position in clip frames
    position: f64,
    /// Clip frames advanced per output frame (resampling ratio)
    step: f64,
    done: Option<oneshot::Sender<()>>,
}

impl Source {
    fn is_finished(&self) -> bool {
        self.position >= self.clip.frames as f64
    }

    /// Mix this source into a block beginning at output frame `block_start`
    fn mix_into(&mut self, out: &mut [f32], channels: usize, block_start: u64, master: f32) {
        let frames = out.len() / channels;
        let offset = self.start_frame.saturating_sub(block_start);
        if offset >= frames as u64 {
            return;
        }

        let gain = self.gain.value() * master;
        for frame in out.chunks_exact_mut(channels).skip(offset as usize) {
            let Some((left, right)) = self.clip.sample_at(self.position) else {
                break;
            };
            if channels == 1 {
                frame[0] += (left + right) * 0.5 * gain;
            } else {
                frame[0] += left * gain;
                frame[1] += right * gain;
            }
            self.position += self.step;
        }
    }
}

/// Mixer and clock shared between the engine and its output driver
pub struct AudioGraph {
    sample_rate: u32,
    frames_rendered: AtomicU64,
    running: AtomicBool,
    master: GainNode,
    sources: Mutex<Vec<Source>>,
}

impl AudioGraph {
    /// Create a running graph
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: AtomicU64::new(0),
            running: AtomicBool::new(true),
            master: GainNode::new(1.0),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Create a graph that stays silent until its output is resumed
    pub fn suspended(sample_rate: u32) -> Self {
        let graph = Self::new(sample_rate);
        graph.running.store(false, Ordering::Release);
        graph
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn current_frame(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// Engine clock in seconds
    pub fn current_time(&self) -> f64 {
        self.current_frame() as f64 / self.sample_rate as f64
    }

    pub fn master_gain(&self) -> &GainNode {
        &self.master
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Number of sources that have not finished yet
    pub fn active_sources(&self) -> usize {
        self.lock_sources().len()
    }

    /// Start `clip` at engine time `when` (seconds) through `gain`.
    ///
    /// A `when` at or before the current time starts on the next rendered
    /// frame. The returned receiver resolves once the last clip frame has
    /// been rendered; it errors if the graph is dropped first.
    pub fn start_source(
        &self,
        clip: Arc<DecodedClip>,
        gain: GainNode,
        when: f64,
    ) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();

        let requested = if when.is_finite() && when > 0.0 {
            (when * self.sample_rate as f64).round() as u64
        } else {
            0
        };
        let start_frame = requested.max(self.current_frame());
        let step = clip.sample_rate as f64 / self.sample_rate as f64;

        trace!(
            "Source scheduled at frame {} ({} frames, step {:.4})",
            start_frame,
            clip.frames,
            step
        );

        self.lock_sources().push(Source {
            clip,
            gain,
            start_frame,
            position: 0.0,
            step,
            done: Some(done_tx),
        });

        done_rx
    }

    /// Render one interleaved block of `channels` channels into `out`
    pub fn render(&self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 || !self.is_running() {
            return;
        }

        let frames = (out.len() / channels) as u64;
        let block_start = self.current_frame();
        let master = self.master.value();

        {
            let mut sources = self.lock_sources();
            for source in sources.iter_mut() {
                source.mix_into(out, channels, block_start, master);
            }
            sources.retain_mut(|source| {
                if !source.is_finished() {
                    return true;
                }
                if let Some(done) = source.done.take() {
                    let _ = done.send(());
                }
                false
            });
        }

        self.frames_rendered.fetch_add(frames, Ordering::AcqRel);
    }

    fn lock_sources(&self) -> MutexGuard<'_, Vec<Source>> {
        // A panic on another thread must not silence the output thread
        self.sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
