//! Sound manager
//!
//! The public facade: owns the resource cache, the element pool, the
//! selected backend, the volume state and the drift corrector, and exposes
//! the playback operations.
//!
//! # Backends
//!
//! At initialization the manager tries to build the precise engine. Clips
//! loaded while it is active are decoded and scheduled on the engine clock
//! with sample accuracy. Without it, clips are played through media
//! elements, with pooling for overlap and adaptive polling for scheduled
//! starts.
//!
//! # Errors
//!
//! Only load failures are returned from `play`, `schedule_play` and
//! `play_sequence`. Playback failures after a successful load are logged,
//! reported as events and settle the session; the completion callback still
//! runs in that case.

pub mod backend;
pub mod cache;
pub mod gain;
pub mod pool;
pub mod scheduler;
pub mod session;

use crate::audio::element::{CommandElementLoader, ElementEvent, ElementLoader, MediaElement};
use crate::audio::engine::{DeviceEngineFactory, EngineFactory, HeadlessEngineFactory, PreciseEngine};
use crate::audio::types::DecodedClip;
use crate::config::{BackendPreference, ManagerConfig};
use crate::error::{Error, Result};
use crate::events::{EventBus, ManagerEvent, PlaybackOutcome};
use crate::fetch::{ResourceFetcher, RoutingFetcher};
use backend::{Backend, BackendKind};
use chime_common::time::duration_to_secs_f64;
use cache::{ClipPayload, LoadState, ResourceCache, ResourceHandle};
use gain::{sanitize_per_play, GainState};
use pool::{ElementPool, PoolLease};
use scheduler::{DriftCorrector, PollThresholds};
use session::{EndCallback, PlaybackSession};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Options for a single play request
pub struct PlayOptions {
    /// Per-play volume in [0, 1]
    pub volume: f32,
    /// Runs once when an attempted playback settles (not on load failure)
    pub on_end: Option<EndCallback>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn on_end<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_end = Some(Box::new(callback));
        self
    }
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            on_end: None,
        }
    }
}

impl fmt::Debug for PlayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayOptions")
            .field("volume", &self.volume)
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

/// One step of a sequence
#[derive(Debug, Default)]
pub struct SequenceEntry {
    pub id: String,
    pub options: PlayOptions,
}

impl SequenceEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            options: PlayOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PlayOptions) -> Self {
        self.options = options;
        self
    }
}

impl From<&str> for SequenceEntry {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SequenceEntry {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Builder for [`SoundManager`] with injectable collaborators
pub struct SoundManagerBuilder {
    config: ManagerConfig,
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    element_loader: Option<Arc<dyn ElementLoader>>,
    engine_factory: Option<Option<Arc<dyn EngineFactory>>>,
}

impl SoundManagerBuilder {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            fetcher: None,
            element_loader: None,
            engine_factory: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn element_loader(mut self, loader: Arc<dyn ElementLoader>) -> Self {
        self.element_loader = Some(loader);
        self
    }

    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.engine_factory = Some(Some(factory));
        self
    }

    /// Never construct the precise engine
    pub fn without_precise_engine(mut self) -> Self {
        self.engine_factory = Some(None);
        self
    }

    /// Fails with a config error when the configuration does not validate
    pub fn build(self) -> Result<SoundManager> {
        let config = self.config.validate()?;

        let fetcher: Arc<dyn ResourceFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(RoutingFetcher::new(&config.fetch)?),
        };
        let element_loader: Arc<dyn ElementLoader> = self
            .element_loader
            .unwrap_or_else(|| Arc::new(CommandElementLoader::from_config(&config)));
        let engine_factory = self
            .engine_factory
            .unwrap_or_else(|| default_engine_factory(&config));

        let events = EventBus::default();
        let pool = Arc::new(ElementPool::new(config.playback.pool_size));
        let cache = ResourceCache::new(fetcher, element_loader, Arc::clone(&pool), events.clone());
        let gain = GainState::new(config.playback.volume, config.playback.muted);
        let corrector = DriftCorrector::new(PollThresholds::from(config.scheduler));

        Ok(SoundManager {
            inner: Arc::new(ManagerInner {
                backend: OnceCell::new(),
                engine_factory,
                cache,
                pool,
                gain,
                corrector,
                events,
                config,
            }),
        })
    }
}

fn default_engine_factory(config: &ManagerConfig) -> Option<Arc<dyn EngineFactory>> {
    match config.playback.backend {
        BackendPreference::Auto => Some(Arc::new(DeviceEngineFactory {
            device: config.playback.device.clone(),
            buffer_size: config.playback.buffer_size,
        })),
        BackendPreference::Headless => Some(Arc::new(HeadlessEngineFactory::default())),
        BackendPreference::Fallback => None,
    }
}

struct ManagerInner {
    config: ManagerConfig,
    backend: OnceCell<Backend>,
    engine_factory: Option<Arc<dyn EngineFactory>>,
    cache: ResourceCache,
    pool: Arc<ElementPool>,
    gain: GainState,
    corrector: DriftCorrector,
    events: EventBus,
}

/// Audio resource manager. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SoundManager {
    inner: Arc<ManagerInner>,
}

impl SoundManager {
    /// Manager with the default collaborators for `config`
    pub fn new(config: ManagerConfig) -> Result<Self> {
        SoundManagerBuilder::new(config).build()
    }

    pub fn builder(config: ManagerConfig) -> SoundManagerBuilder {
        SoundManagerBuilder::new(config)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Select the backend. Idempotent; concurrent callers share one selection.
    pub async fn init(&self) -> BackendKind {
        self.inner.backend().await.kind()
    }

    /// Selected backend, or None before initialization
    pub fn backend(&self) -> Option<BackendKind> {
        self.inner.backend.get().map(Backend::kind)
    }

    /// Load a resource into the cache (initializing first if needed)
    pub async fn load(&self, id: &str) -> Result<ResourceHandle> {
        let backend = self.inner.backend().await;
        self.inner.cache.load(id, backend.engine().cloned()).await
    }

    /// Play `id` now. Resolves when playback has finished.
    pub async fn play(&self, id: &str, options: PlayOptions) -> Result<()> {
        self.inner.play_at(id, options, None).await
    }

    /// Play `id` after `delay_ms` milliseconds measured from this call.
    ///
    /// Zero or negative delays play immediately. Resolves when playback has
    /// finished.
    pub async fn schedule_play(&self, id: &str, delay_ms: i64, options: PlayOptions) -> Result<()> {
        let target = Instant::now() + chime_common::time::signed_millis_to_duration(delay_ms);
        self.inner.play_at(id, options, Some(target)).await
    }

    /// Play entries strictly one after another.
    ///
    /// Stops at the first load failure; entries after it are not played.
    pub async fn play_sequence<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = SequenceEntry>,
    {
        for entry in entries {
            self.play(&entry.id, entry.options).await?;
        }
        Ok(())
    }

    /// Load every identifier concurrently. Individual failures are logged.
    pub async fn preload_sounds<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let loads = ids.into_iter().map(|id| async move {
            let id = id.as_ref();
            if let Err(e) = self.load(id).await {
                warn!("Preload of {} failed: {}", id, e);
            }
        });
        futures::future::join_all(loads).await;
    }

    /// Set the global volume (clamped to [0, 1]); returns the volume in effect
    pub fn set_volume(&self, volume: f32) -> f32 {
        let applied = self.inner.gain.set_volume(volume);
        debug!("Volume set to {:.2}", applied);
        applied
    }

    pub fn set_mute(&self, muted: bool) {
        self.inner.gain.set_muted(muted);
        debug!("Mute {}", if muted { "on" } else { "off" });
    }

    pub fn volume(&self) -> f32 {
        self.inner.gain.volume()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.gain.is_muted()
    }

    /// Current master gain: 0 when muted, otherwise the global volume
    pub fn effective_gain(&self) -> f32 {
        self.inner.gain.effective_master()
    }

    /// Element volume a play with `per_play` volume would start at
    pub fn effective_element_volume(&self, per_play: f32) -> f32 {
        self.inner.gain.effective_element(per_play)
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.inner.cache.state(id) == LoadState::Ready
    }

    pub fn load_state(&self, id: &str) -> LoadState {
        self.inner.cache.state(id)
    }

    /// Pooled elements for `id` (element backend only)
    pub fn pool_len(&self, id: &str) -> usize {
        self.inner.pool.len(id)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events.subscribe()
    }
}

impl ManagerInner {
    async fn backend(&self) -> &Backend {
        self.backend
            .get_or_init(|| async {
                let backend = backend::select_backend(self.engine_factory.clone()).await;
                if let Some(engine) = backend.engine() {
                    self.gain.attach_master(engine.master_gain().clone());
                }
                info!("Sound manager initialized with {} backend", backend.kind());
                self.events.emit(ManagerEvent::BackendSelected {
                    backend: backend.kind(),
                    timestamp: chrono::Utc::now(),
                });
                backend
            })
            .await
    }

    async fn play_at(&self, id: &str, options: PlayOptions, target: Option<Instant>) -> Result<()> {
        let backend = self.backend().await.clone();
        let handle = self.cache.load(id, backend.engine().cloned()).await?;

        match handle.payload() {
            ClipPayload::Precise(clip) => {
                let engine = backend.engine().ok_or_else(|| {
                    Error::Playback(format!("{} was decoded but no precise engine is active", id))
                })?;
                self.play_precise(engine, &handle, Arc::clone(clip), options, target)
                    .await;
            }
            ClipPayload::Fallback(template) => {
                self.play_element(&handle, template, options, target).await;
            }
        }
        Ok(())
    }

    async fn play_precise(
        &self,
        engine: &PreciseEngine,
        handle: &ResourceHandle,
        clip: Arc<DecodedClip>,
        options: PlayOptions,
        target: Option<Instant>,
    ) {
        let when = match target {
            Some(target) => {
                let remaining = target.saturating_duration_since(Instant::now());
                engine.current_time() + duration_to_secs_f64(remaining)
            }
            None => 0.0,
        };

        let mut session = PlaybackSession::new(
            handle.id(),
            BackendKind::Precise,
            options.on_end,
            self.events.clone(),
        );
        let done = engine.start_clip(clip, sanitize_per_play(options.volume), when);
        session.started();

        let outcome = match done.await {
            Ok(()) => PlaybackOutcome::Ended,
            Err(_) => {
                error!("Precise engine stopped before {} finished", handle.id());
                PlaybackOutcome::Failed("engine stopped".to_string())
            }
        };
        session.settle(outcome);
    }

    async fn play_element(
        &self,
        handle: &ResourceHandle,
        template: &Arc<dyn MediaElement>,
        options: PlayOptions,
        target: Option<Instant>,
    ) {
        if let Some(target) = target {
            let report = self.corrector.wait_until(target).await;
            debug!(
                "Scheduled play of {} firing after {} polls ({:?} late)",
                handle.id(),
                report.polls,
                report.lateness
            );
        }

        let (element, lease) = self.acquire_element(handle, template);
        element.set_volume(self.gain.effective_element(options.volume));
        if let Err(e) = element.seek_to_start() {
            debug!("Element for {} refused rewind: {}", handle.id(), e);
        }

        let mut session = PlaybackSession::new(
            handle.id(),
            BackendKind::Fallback,
            options.on_end,
            self.events.clone(),
        );

        // Subscribe before starting so a fast end is not missed
        let mut element_events = element.subscribe();
        if let Err(e) = element.play() {
            warn!("Playback of {} failed to start: {}", handle.id(), e);
            session.settle(PlaybackOutcome::Failed(e.to_string()));
            return;
        }
        session.started();

        let outcome = wait_for_end(element.as_ref(), &mut element_events).await;
        if let PlaybackOutcome::Failed(reason) = &outcome {
            warn!("Playback of {} failed: {}", handle.id(), reason);
        }

        drop(element_events);
        drop(lease);
        session.settle(outcome);
    }

    /// A pooled element if one is free, otherwise a transient clone
    fn acquire_element(
        &self,
        handle: &ResourceHandle,
        template: &Arc<dyn MediaElement>,
    ) -> (Arc<dyn MediaElement>, Option<PoolLease>) {
        if let Some(lease) = self.pool.acquire(handle.id()) {
            if lease.element().source() == handle.id() {
                return (Arc::clone(lease.element()), Some(lease));
            }
            error!(
                "Pooled element plays {} but {} was requested",
                lease.element().source(),
                handle.id()
            );
        }

        debug!("No free pooled element for {}, using a transient clone", handle.id());
        (template.clone_element(), None)
    }
}

async fn wait_for_end(
    element: &dyn MediaElement,
    events: &mut broadcast::Receiver<ElementEvent>,
) -> PlaybackOutcome {
    loop {
        match events.recv().await {
            Ok(ElementEvent::Ended) => return PlaybackOutcome::Ended,
            Ok(ElementEvent::Error(reason)) => return PlaybackOutcome::Failed(reason),
            Ok(ElementEvent::Started) => continue,
            Err(broadcast::error::RecvError::Lagged(_)) => {
                if element.has_ended() {
                    return PlaybackOutcome::Ended;
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                return if element.has_ended() {
                    PlaybackOutcome::Ended
                } else {
                    PlaybackOutcome::Failed("element closed before ending".to_string())
                };
            }
        }
    }
}
