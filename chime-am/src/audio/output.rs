//! Audio output drivers
//!
//! A driver pulls blocks from an [`AudioGraph`] and delivers them somewhere:
//! a cpal device stream ([`CpalOutput`]) or nowhere at real-time pace
//! ([`NullOutput`], used for headless operation and tests).
//!
//! cpal streams are not `Send` on every platform, so the device stream lives
//! on a dedicated thread and is controlled through a command channel.

use crate::audio::graph::AudioGraph;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Control surface the engine needs from an output
pub trait OutputDriver: Send + Sync {
    /// Human-readable output name for logs
    fn name(&self) -> &str;

    /// Start (or restart) delivery. On success the graph is running.
    fn resume(&self) -> Result<()>;
}

enum OutputCommand {
    Resume(mpsc::Sender<Result<()>>),
    Shutdown,
}

/// Device output via cpal
pub struct CpalOutput {
    name: String,
    commands: Mutex<mpsc::Sender<OutputCommand>>,
}

impl CpalOutput {
    /// Open the named device (or the default) and start its stream.
    ///
    /// Returns the driver together with the graph it renders. If the stream
    /// was built but refused to start, the graph is left suspended and the
    /// caller may retry through [`OutputDriver::resume`].
    pub fn open(device_name: Option<String>, buffer_size: Option<u32>) -> Result<(Self, Arc<AudioGraph>)> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (command_tx, command_rx) = mpsc::channel();

        thread::Builder::new()
            .name("chime-audio-out".to_string())
            .spawn(move || run_device_thread(device_name, buffer_size, ready_tx, command_rx))?;

        let (graph, name) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio output thread exited during setup".to_string()))??;

        Ok((
            Self {
                name,
                commands: Mutex::new(command_tx),
            },
            graph,
        ))
    }

    fn send(&self, command: OutputCommand) -> Result<()> {
        let commands = self
            .commands
            .lock()
            .map_err(|_| Error::AudioOutput("Output command channel poisoned".to_string()))?;
        commands
            .send(command)
            .map_err(|_| Error::AudioOutput("Audio output thread has stopped".to_string()))
    }
}

impl OutputDriver for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(OutputCommand::Resume(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio output thread has stopped".to_string()))?
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.send(OutputCommand::Shutdown);
    }
}

fn run_device_thread(
    device_name: Option<String>,
    buffer_size: Option<u32>,
    ready_tx: mpsc::Sender<Result<(Arc<AudioGraph>, String)>>,
    commands: mpsc::Receiver<OutputCommand>,
) {
    let (stream, graph, name) = match open_stream(device_name, buffer_size) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    match stream.play() {
        Ok(()) => {
            graph.set_running(true);
            info!("Audio stream started on {}", name);
        }
        Err(e) => warn!("Audio stream on {} created suspended: {}", name, e),
    }

    if ready_tx.send(Ok((Arc::clone(&graph), name.clone()))).is_err() {
        return;
    }

    while let Ok(command) = commands.recv() {
        match command {
            OutputCommand::Resume(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)));
                if result.is_ok() {
                    graph.set_running(true);
                }
                let _ = reply.send(result);
            }
            OutputCommand::Shutdown => break,
        }
    }

    debug!("Audio output thread for {} stopping", name);
    graph.set_running(false);
}

fn open_stream(
    device_name: Option<String>,
    buffer_size: Option<u32>,
) -> Result<(Stream, Arc<AudioGraph>, String)> {
    let host = cpal::default_host();
    let (device, name) = select_device(&host, device_name.as_deref())?;

    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    let sample_format = supported.sample_format();
    let mut config = supported.config();

    if let Some(size) = buffer_size {
        config.buffer_size = cpal::BufferSize::Fixed(size);
        debug!("Using requested buffer size: {} frames", size);
    }

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
        config.sample_rate.0, config.channels, sample_format, config.buffer_size
    );

    let graph = Arc::new(AudioGraph::suspended(config.sample_rate.0));

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&graph))?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&graph))?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&graph))?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    Ok((stream, graph, name))
}

fn select_device(host: &cpal::Host, requested: Option<&str>) -> Result<(Device, String)> {
    if let Some(requested) = requested {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(requested)) {
            info!("Found requested audio device: {}", requested);
            return Ok((device, requested.to_string()));
        }
        warn!(
            "Requested device '{}' not found, falling back to default device",
            requested
        );
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using default audio device: {}", name);
    Ok((device, name))
}

fn build_stream<T>(device: &Device, config: &StreamConfig, graph: Arc<AudioGraph>) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                graph.render(&mut scratch, channels);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample.clamp(-1.0, 1.0));
                }
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

/// Output that discards audio while keeping the graph clock at real time
pub struct NullOutput {
    graph: Arc<AudioGraph>,
    stop: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl NullOutput {
    /// Frames rendered per wakeup
    pub const BLOCK_FRAMES: usize = 256;

    /// Start rendering `graph` on a background thread
    pub fn start(graph: Arc<AudioGraph>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let graph = Arc::clone(&graph);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("chime-null-out".to_string())
                .spawn(move || run_null_loop(&graph, &stop))?
        };

        graph.set_running(true);
        Ok(Self {
            graph,
            stop,
            thread: Mutex::new(Some(thread)),
        })
    }
}

fn run_null_loop(graph: &AudioGraph, stop: &AtomicBool) {
    let block = Duration::from_secs_f64(NullOutput::BLOCK_FRAMES as f64 / graph.sample_rate() as f64);
    let mut scratch = vec![0.0f32; NullOutput::BLOCK_FRAMES * 2];
    let mut next_block = Instant::now();

    while !stop.load(Ordering::Acquire) {
        graph.render(&mut scratch, 2);
        next_block += block;

        let now = Instant::now();
        if next_block > now {
            thread::sleep(next_block - now);
        } else if now - next_block > block * 8 {
            // Fell far behind (suspended process, loaded host): resync
            next_block = now;
        }
    }
}

impl OutputDriver for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn resume(&self) -> Result<()> {
        self.graph.set_running(true);
        Ok(())
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}
