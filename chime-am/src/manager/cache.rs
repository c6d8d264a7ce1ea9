//! Resource cache with in-flight load deduplication
//!
//! Per identifier the cache moves through absent → loading → ready. While a
//! load is in flight every caller awaits the same shared future, so the
//! bytes are fetched once. Failures are not cached: the identifier returns
//! to absent and the next request retries.

use crate::audio::decode::extension_hint;
use crate::audio::element::{ElementLoader, MediaElement};
use crate::audio::engine::PreciseEngine;
use crate::audio::types::DecodedClip;
use crate::error::{Error, Result};
use crate::events::{EventBus, ManagerEvent};
use crate::fetch::ResourceFetcher;
use crate::manager::backend::BackendKind;
use crate::manager::pool::ElementPool;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Backend-specific loaded data
#[derive(Clone)]
pub enum ClipPayload {
    /// Decoded samples for the precise engine
    Precise(Arc<DecodedClip>),
    /// Template element for the media element backend
    Fallback(Arc<dyn MediaElement>),
}

/// A loaded resource. Cheap to clone; clones share the payload.
#[derive(Clone)]
pub struct ResourceHandle {
    id: Arc<str>,
    payload: ClipPayload,
}

impl ResourceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &ClipPayload {
        &self.payload
    }

    pub fn backend(&self) -> BackendKind {
        match self.payload {
            ClipPayload::Precise(_) => BackendKind::Precise,
            ClipPayload::Fallback(_) => BackendKind::Fallback,
        }
    }

    /// True if both handles share the same loaded payload
    pub fn same_payload(&self, other: &ResourceHandle) -> bool {
        match (&self.payload, &other.payload) {
            (ClipPayload::Precise(a), ClipPayload::Precise(b)) => Arc::ptr_eq(a, b),
            (ClipPayload::Fallback(a), ClipPayload::Fallback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("backend", &self.backend())
            .finish()
    }
}

/// Cache state of one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Absent,
    Loading,
    Ready,
}

type SharedLoad = Shared<BoxFuture<'static, std::result::Result<ResourceHandle, Arc<Error>>>>;

#[derive(Default)]
struct CacheEntries {
    ready: HashMap<String, ResourceHandle>,
    loading: HashMap<String, SharedLoad>,
}

struct CacheInner {
    entries: Mutex<CacheEntries>,
    fetcher: Arc<dyn ResourceFetcher>,
    elements: Arc<dyn ElementLoader>,
    pool: Arc<ElementPool>,
    events: EventBus,
}

impl CacheInner {
    fn lock_entries(&self) -> MutexGuard<'_, CacheEntries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        elements: Arc<dyn ElementLoader>,
        pool: Arc<ElementPool>,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(CacheEntries::default()),
                fetcher,
                elements,
                pool,
                events,
            }),
        }
    }

    /// Load `id`, decoding for `engine` when one is given.
    ///
    /// Returns the cached handle if ready, joins an in-flight load if one
    /// exists, and otherwise starts a new load.
    pub async fn load(&self, id: &str, engine: Option<Arc<PreciseEngine>>) -> Result<ResourceHandle> {
        let pending = {
            let mut entries = self.inner.lock_entries();
            if let Some(handle) = entries.ready.get(id) {
                return Ok(handle.clone());
            }
            match entries.loading.get(id) {
                Some(pending) => {
                    debug!("Joining in-flight load of {}", id);
                    pending.clone()
                }
                None => {
                    let pending = run_load(Arc::clone(&self.inner), id.to_string(), engine)
                        .boxed()
                        .shared();
                    entries.loading.insert(id.to_string(), pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(|source| Error::Load {
            id: id.to_string(),
            source,
        })
    }

    pub fn state(&self, id: &str) -> LoadState {
        let entries = self.inner.lock_entries();
        if entries.ready.contains_key(id) {
            LoadState::Ready
        } else if entries.loading.contains_key(id) {
            LoadState::Loading
        } else {
            LoadState::Absent
        }
    }
}

async fn run_load(
    inner: Arc<CacheInner>,
    id: String,
    engine: Option<Arc<PreciseEngine>>,
) -> std::result::Result<ResourceHandle, Arc<Error>> {
    debug!("Loading {}", id);
    let result = fetch_and_prepare(&inner, &id, engine).await;

    {
        let mut entries = inner.lock_entries();
        entries.loading.remove(&id);
        if let Ok(handle) = &result {
            entries.ready.insert(id.clone(), handle.clone());
        }
    }

    match result {
        Ok(handle) => {
            debug!("Loaded {} for {} backend", id, handle.backend());
            inner.events.emit(ManagerEvent::ClipLoaded {
                id,
                backend: handle.backend(),
                timestamp: chrono::Utc::now(),
            });
            Ok(handle)
        }
        Err(e) => {
            warn!("Failed to load {}: {}", id, e);
            inner.events.emit(ManagerEvent::LoadFailed {
                id,
                error: e.to_string(),
                timestamp: chrono::Utc::now(),
            });
            Err(Arc::new(e))
        }
    }
}

async fn fetch_and_prepare(
    inner: &CacheInner,
    id: &str,
    engine: Option<Arc<PreciseEngine>>,
) -> Result<ResourceHandle> {
    let bytes = inner.fetcher.fetch(id).await?;

    if let Some(engine) = engine {
        let extension = extension_hint(id).map(str::to_string);
        let encoded = bytes.clone();
        let decoded =
            tokio::task::spawn_blocking(move || engine.decode(encoded, extension.as_deref())).await;

        match decoded {
            Ok(Ok(clip)) => {
                return Ok(ResourceHandle {
                    id: Arc::from(id),
                    payload: ClipPayload::Precise(Arc::new(clip)),
                });
            }
            Ok(Err(e)) => debug!("Precise decode of {} failed, trying media element: {}", id, e),
            Err(e) => warn!("Decode task for {} panicked, trying media element: {}", id, e),
        }
    }

    let element = inner.elements.load(id, bytes).await?;
    inner.pool.create(id, &element);

    Ok(ResourceHandle {
        id: Arc::from(id),
        payload: ClipPayload::Fallback(element),
    })
}
