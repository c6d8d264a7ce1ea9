//! Recording mocks for the manager's collaborators
//!
//! Timing uses `tokio::time`, so tests can run with a paused clock and get
//! exact instants.

#![allow(dead_code)]

use async_trait::async_trait;
use chime_am::audio::{
    AudioGraph, ElementEvent, ElementLoader, EngineFactory, MediaElement, OutputDriver, PreciseEngine,
};
use chime_am::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

// ========================================
// Fetcher
// ========================================

/// Serves registered clips after an optional delay and counts requests
#[derive(Default)]
pub struct MockFetcher {
    clips: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_clip(self: &Arc<Self>, id: &str, bytes: Vec<u8>) -> Arc<Self> {
        self.clips.lock().unwrap().insert(id.to_string(), bytes);
        Arc::clone(self)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_failing(&self, id: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }

    pub fn calls(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl chime_am::fetch::ResourceFetcher for MockFetcher {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        *self.calls.lock().unwrap().entry(id.to_string()).or_insert(0) += 1;

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(id) {
            return Err(Error::Fetch {
                id: id.to_string(),
                reason: "mock failure".to_string(),
            });
        }

        self.clips
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Fetch {
                id: id.to_string(),
                reason: "404 Not Found".to_string(),
            })
    }
}

// ========================================
// Media elements
// ========================================

/// One call to `play` on a mock element
#[derive(Debug, Clone)]
pub struct PlayRecord {
    pub source: String,
    pub element_id: usize,
    pub volume: f32,
    pub started_at: Instant,
}

/// Shared record of every play and end across mock elements
#[derive(Default)]
pub struct PlayLog {
    plays: Mutex<Vec<PlayRecord>>,
    ends: Mutex<Vec<(String, usize, Instant)>>,
}

impl PlayLog {
    pub fn plays(&self) -> Vec<PlayRecord> {
        self.plays.lock().unwrap().clone()
    }

    pub fn ends(&self) -> Vec<(String, usize, Instant)> {
        self.ends.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PlayBehavior {
    /// Ends normally after the clip length
    EndAfter(Duration),
    /// `play` itself returns an error
    RefuseToPlay,
    /// Reports an error event after the given time
    ErrorAfter(Duration),
}

static NEXT_ELEMENT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug)]
pub struct MockElement {
    id: usize,
    source: String,
    behavior: PlayBehavior,
    playing: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    volume: AtomicU32,
    events: broadcast::Sender<ElementEvent>,
    log: Arc<PlayLogHandle>,
}

/// `PlayLog` wrapper so `MockElement` can derive Debug
#[derive(Default)]
pub struct PlayLogHandle(pub Arc<PlayLog>);

impl std::fmt::Debug for PlayLogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlayLog")
    }
}

impl MockElement {
    fn new(source: &str, behavior: PlayBehavior, log: Arc<PlayLogHandle>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            id: NEXT_ELEMENT_ID.fetch_add(1, Ordering::SeqCst),
            source: source.to_string(),
            behavior,
            playing: Arc::new(AtomicBool::new(false)),
            ended: Arc::new(AtomicBool::new(false)),
            volume: AtomicU32::new(1.0f32.to_bits()),
            events,
            log,
        }
    }
}

impl MediaElement for MockElement {
    fn source(&self) -> &str {
        &self.source
    }

    fn clone_element(&self) -> Arc<dyn MediaElement> {
        Arc::new(MockElement::new(&self.source, self.behavior, Arc::clone(&self.log)))
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::SeqCst))
    }

    fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::SeqCst);
    }

    fn seek_to_start(&self) -> Result<()> {
        self.ended.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let duration = match self.behavior {
            PlayBehavior::RefuseToPlay => {
                return Err(Error::Playback("autoplay blocked".to_string()));
            }
            PlayBehavior::EndAfter(d) | PlayBehavior::ErrorAfter(d) => d,
        };

        self.log.0.plays.lock().unwrap().push(PlayRecord {
            source: self.source.clone(),
            element_id: self.id,
            volume: self.volume(),
            started_at: Instant::now(),
        });

        self.playing.store(true, Ordering::SeqCst);
        let _ = self.events.send(ElementEvent::Started);

        let playing = Arc::clone(&self.playing);
        let ended = Arc::clone(&self.ended);
        let events = self.events.clone();
        let log = Arc::clone(&self.log);
        let source = self.source.clone();
        let id = self.id;
        let fails = matches!(self.behavior, PlayBehavior::ErrorAfter(_));
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            playing.store(false, Ordering::SeqCst);
            if fails {
                let _ = events.send(ElementEvent::Error("decode error".to_string()));
            } else {
                ended.store(true, Ordering::SeqCst);
                log.0.ends.lock().unwrap().push((source, id, Instant::now()));
                let _ = events.send(ElementEvent::Ended);
            }
        });
        Ok(())
    }

    fn pause(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<ElementEvent> {
        self.events.subscribe()
    }
}

/// Creates [`MockElement`]s, one clip length per identifier
pub struct MockElementLoader {
    log: Arc<PlayLogHandle>,
    default_behavior: PlayBehavior,
    behaviors: Mutex<HashMap<String, PlayBehavior>>,
    loads: AtomicUsize,
}

impl MockElementLoader {
    pub fn new(clip_length: Duration) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(PlayLogHandle::default()),
            default_behavior: PlayBehavior::EndAfter(clip_length),
            behaviors: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, id: &str, behavior: PlayBehavior) {
        self.behaviors.lock().unwrap().insert(id.to_string(), behavior);
    }

    pub fn log(&self) -> Arc<PlayLog> {
        Arc::clone(&self.log.0)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ElementLoader for MockElementLoader {
    async fn load(&self, id: &str, _bytes: Vec<u8>) -> Result<Arc<dyn MediaElement>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(self.default_behavior);
        Ok(Arc::new(MockElement::new(id, behavior, Arc::clone(&self.log))))
    }
}

// ========================================
// Engine factories
// ========================================

/// Always fails, counting attempts
#[derive(Default)]
pub struct FailingEngineFactory {
    attempts: AtomicUsize,
}

impl FailingEngineFactory {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EngineFactory for FailingEngineFactory {
    fn create(&self) -> Result<PreciseEngine> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::AudioOutput("no output device".to_string()))
    }
}

/// Output whose graph is rendered by the test itself
pub struct ManualOutput {
    graph: Arc<AudioGraph>,
    resume_fails: bool,
}

impl OutputDriver for ManualOutput {
    fn name(&self) -> &str {
        "manual"
    }

    fn resume(&self) -> Result<()> {
        if self.resume_fails {
            return Err(Error::AudioOutput("resume refused".to_string()));
        }
        self.graph.set_running(true);
        Ok(())
    }
}

/// Builds engines on a test-driven graph and keeps a handle to it
pub struct ManualEngineFactory {
    sample_rate: u32,
    start_suspended: bool,
    resume_fails: bool,
    graph: Mutex<Option<Arc<AudioGraph>>>,
    attempts: AtomicUsize,
}

impl ManualEngineFactory {
    pub fn new(sample_rate: u32) -> Arc<Self> {
        Self::build(sample_rate, false, false)
    }

    pub fn suspended(sample_rate: u32, resume_fails: bool) -> Arc<Self> {
        Self::build(sample_rate, true, resume_fails)
    }

    fn build(sample_rate: u32, start_suspended: bool, resume_fails: bool) -> Arc<Self> {
        Arc::new(Self {
            sample_rate,
            start_suspended,
            resume_fails,
            graph: Mutex::new(None),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn graph(&self) -> Arc<AudioGraph> {
        self.graph
            .lock()
            .unwrap()
            .clone()
            .expect("engine has not been created yet")
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EngineFactory for ManualEngineFactory {
    fn create(&self) -> Result<PreciseEngine> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let graph = Arc::new(if self.start_suspended {
            AudioGraph::suspended(self.sample_rate)
        } else {
            AudioGraph::new(self.sample_rate)
        });
        *self.graph.lock().unwrap() = Some(Arc::clone(&graph));
        Ok(PreciseEngine::new(
            Arc::clone(&graph),
            Box::new(ManualOutput {
                graph,
                resume_fails: self.resume_fails,
            }),
        ))
    }
}

/// Render `frames` stereo frames and return the left channel
pub fn render_left(graph: &AudioGraph, frames: usize) -> Vec<f32> {
    let mut block = vec![0.0f32; frames * 2];
    graph.render(&mut block, 2);
    block.chunks(2).map(|frame| frame[0]).collect()
}

/// Yield until the graph holds `count` active sources
pub async fn wait_for_sources(graph: &AudioGraph, count: usize) {
    for _ in 0..5_000 {
        if graph.active_sources() >= count {
            return;
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("graph never reached {} active sources", count);
}
