//! Media elements for the fallback backend
//!
//! A media element is a self-contained player for one clip: it can be
//! played, paused and rewound, carries its own volume, and reports
//! start/end/error through a broadcast channel. Elements are cloned to
//! obtain independent players of the same clip.
//!
//! [`CommandElement`] plays through an external system player process
//! (`paplay`, `afplay`, ...) configured as an argv template.

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::fetch;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::process::Command;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

/// Lifecycle notifications from an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementEvent {
    Started,
    Ended,
    Error(String),
}

/// A playable, rewindable, cloneable player for a single clip
pub trait MediaElement: Send + Sync + fmt::Debug {
    /// Identifier of the clip this element plays
    fn source(&self) -> &str;

    /// Independent element for the same source, idle and at the start
    fn clone_element(&self) -> Arc<dyn MediaElement>;

    fn is_playing(&self) -> bool;

    fn has_ended(&self) -> bool;

    fn volume(&self) -> f32;

    fn set_volume(&self, volume: f32);

    /// Rewind to the start. May be refused while playing.
    fn seek_to_start(&self) -> Result<()>;

    fn play(&self) -> Result<()>;

    fn pause(&self);

    fn subscribe(&self) -> broadcast::Receiver<ElementEvent>;
}

/// Creates elements from fetched clip bytes
#[async_trait]
pub trait ElementLoader: Send + Sync {
    async fn load(&self, id: &str, bytes: Vec<u8>) -> Result<Arc<dyn MediaElement>>;
}

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayState {
    Idle,
    Playing,
    Ended,
}

#[derive(Debug)]
struct ProcessState {
    state: PlayState,
    stop: Option<oneshot::Sender<()>>,
}

/// Element backed by an external player process
pub struct CommandElement {
    source: Arc<str>,
    path: Arc<Path>,
    player: Arc<[String]>,
    volume: AtomicU32,
    process: Arc<Mutex<ProcessState>>,
    events: broadcast::Sender<ElementEvent>,
}

impl CommandElement {
    pub fn new(source: impl Into<Arc<str>>, path: impl Into<Arc<Path>>, player: Arc<[String]>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source: source.into(),
            path: path.into(),
            player,
            volume: AtomicU32::new(1.0f32.to_bits()),
            process: Arc::new(Mutex::new(ProcessState {
                state: PlayState::Idle,
                stop: None,
            })),
            events,
        }
    }

    /// Local file the player is pointed at
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Player argv with placeholders substituted
    pub fn command_line(&self) -> Vec<String> {
        let volume = self.volume();
        let path = self.path.display().to_string();
        let volume_text = format!("{:.2}", volume);
        let volume_pct = format!("{}", (volume * 100.0).round() as u32);
        let volume_pa = format!("{}", (volume * 65536.0).round() as u32);

        self.player
            .iter()
            .map(|arg| {
                arg.replace("{path}", &path)
                    .replace("{volume_pct}", &volume_pct)
                    .replace("{volume_pa}", &volume_pa)
                    .replace("{volume}", &volume_text)
            })
            .collect()
    }

    fn lock_process(&self) -> MutexGuard<'_, ProcessState> {
        self.process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CommandElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandElement")
            .field("source", &self.source)
            .field("path", &self.path)
            .field("volume", &self.volume())
            .finish()
    }
}

impl MediaElement for CommandElement {
    fn source(&self) -> &str {
        &self.source
    }

    fn clone_element(&self) -> Arc<dyn MediaElement> {
        let clone = CommandElement::new(
            Arc::clone(&self.source),
            Arc::clone(&self.path),
            Arc::clone(&self.player),
        );
        clone.set_volume(self.volume());
        Arc::new(clone)
    }

    fn is_playing(&self) -> bool {
        self.lock_process().state == PlayState::Playing
    }

    fn has_ended(&self) -> bool {
        self.lock_process().state == PlayState::Ended
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn seek_to_start(&self) -> Result<()> {
        let mut process = self.lock_process();
        if process.state == PlayState::Playing {
            return Err(Error::Playback(format!(
                "{} is playing in an external player and cannot be rewound",
                self.source
            )));
        }
        process.state = PlayState::Idle;
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::Playback("No async runtime available for the player process".to_string()))?;

        let mut process = self.lock_process();
        if process.state == PlayState::Playing {
            return Err(Error::Playback(format!("{} is already playing", self.source)));
        }

        let argv = self.command_line();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Config("Player command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Playback(format!("Failed to start {}: {}", program, e)))?;

        debug!("Started {} for {}", program, self.source);

        let (stop_tx, stop_rx) = oneshot::channel();
        process.state = PlayState::Playing;
        process.stop = Some(stop_tx);
        drop(process);

        let _ = self.events.send(ElementEvent::Started);

        let shared = Arc::clone(&self.process);
        let events = self.events.clone();
        let source = Arc::clone(&self.source);
        runtime.spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => Some(match status {
                    Ok(status) if status.success() => ElementEvent::Ended,
                    Ok(status) => ElementEvent::Error(format!("player exited with {}", status)),
                    Err(e) => ElementEvent::Error(format!("failed to wait for player: {}", e)),
                }),
                _ = stop_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to stop player for {}: {}", source, e);
                    }
                    None
                }
            };

            let Some(event) = outcome else {
                return;
            };

            {
                let mut process = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                process.state = match event {
                    ElementEvent::Ended => PlayState::Ended,
                    _ => PlayState::Idle,
                };
                process.stop = None;
            }
            let _ = events.send(event);
        });

        Ok(())
    }

    fn pause(&self) {
        let mut process = self.lock_process();
        if let Some(stop) = process.stop.take() {
            let _ = stop.send(());
        }
        if process.state != PlayState::Playing {
            return;
        }
        process.state = PlayState::Idle;
        drop(process);

        // Every Started is followed by exactly one terminal event
        debug!("Stopped player for {}", self.source);
        let _ = self.events.send(ElementEvent::Error("paused".to_string()));
    }

    fn subscribe(&self) -> broadcast::Receiver<ElementEvent> {
        self.events.subscribe()
    }
}

/// Loads clips as [`CommandElement`]s.
///
/// Local identifiers are played in place. Remote clip bytes are spilled to
/// `cache_dir` under a name derived from the identifier hash.
#[derive(Debug, Clone)]
pub struct CommandElementLoader {
    player: Arc<[String]>,
    cache_dir: PathBuf,
    base_dir: Option<PathBuf>,
}

impl CommandElementLoader {
    pub fn new(player: Vec<String>, cache_dir: PathBuf, base_dir: Option<PathBuf>) -> Self {
        Self {
            player: player.into(),
            cache_dir,
            base_dir,
        }
    }

    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(
            config.fallback.player.clone(),
            config.fallback.resolved_cache_dir(),
            config.fetch.base_dir.clone(),
        )
    }

    /// Spill location for a remote identifier
    pub fn spill_path(&self, id: &str) -> PathBuf {
        let digest = Sha256::digest(id.as_bytes());
        let ext = crate::audio::decode::extension_hint(id).unwrap_or("bin");
        self.cache_dir.join(format!("{:x}.{}", digest, ext))
    }
}

#[async_trait]
impl ElementLoader for CommandElementLoader {
    async fn load(&self, id: &str, bytes: Vec<u8>) -> Result<Arc<dyn MediaElement>> {
        if let Some(path) = fetch::local_path(id, self.base_dir.as_deref()) {
            if tokio::fs::metadata(&path).await.is_ok() {
                return Ok(Arc::new(CommandElement::new(id, path, Arc::clone(&self.player))));
            }
        }

        if bytes.is_empty() {
            return Err(Error::Playback(format!("No audio data for {}", id)));
        }

        let path = self.spill_path(id);
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(&path, &bytes).await?;
        debug!("Spilled {} bytes for {} to {}", bytes.len(), id, path.display());

        Ok(Arc::new(CommandElement::new(id, path, Arc::clone(&self.player))))
    }
}
