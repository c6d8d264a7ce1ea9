//! Element pool for overlapping playback on the media element backend
//!
//! Each loaded identifier gets a fixed set of clones. A pool is created once
//! and never grows; when every member is busy the caller falls back to a
//! transient clone that is discarded after playback.

use crate::audio::element::MediaElement;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

struct PooledElement {
    element: Arc<dyn MediaElement>,
    leased: Arc<AtomicBool>,
}

/// Exclusive use of a pooled element; released on drop
pub struct PoolLease {
    element: Arc<dyn MediaElement>,
    leased: Arc<AtomicBool>,
}

impl PoolLease {
    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.leased.store(false, Ordering::Release);
    }
}

pub struct ElementPool {
    size: usize,
    pools: Mutex<HashMap<String, Vec<PooledElement>>>,
}

impl ElementPool {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Members per identifier
    pub fn size(&self) -> usize {
        self.size
    }

    /// Create the pool for `id` from `template`.
    ///
    /// Returns false if a pool already exists or the template plays a
    /// different source.
    pub fn create(&self, id: &str, template: &Arc<dyn MediaElement>) -> bool {
        if template.source() != id {
            error!(
                "Refusing to pool element for {} under identifier {}",
                template.source(),
                id
            );
            return false;
        }

        let mut pools = self.lock_pools();
        if pools.contains_key(id) {
            return false;
        }

        let members = (0..self.size)
            .map(|_| PooledElement {
                element: template.clone_element(),
                leased: Arc::new(AtomicBool::new(false)),
            })
            .collect();
        pools.insert(id.to_string(), members);
        debug!("Created element pool of {} for {}", self.size, id);
        true
    }

    /// Lease a member that is neither leased nor playing, rewound to the start.
    pub fn acquire(&self, id: &str) -> Option<PoolLease> {
        let pools = self.lock_pools();
        let members = pools.get(id)?;

        for member in members {
            if member.element.is_playing() {
                continue;
            }
            if member
                .leased
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            if let Err(e) = member.element.seek_to_start() {
                debug!("Pooled element for {} refused rewind: {}", id, e);
            }
            return Some(PoolLease {
                element: Arc::clone(&member.element),
                leased: Arc::clone(&member.leased),
            });
        }

        None
    }

    /// Number of pooled members for `id` (0 when no pool exists)
    pub fn len(&self, id: &str) -> usize {
        self.lock_pools().get(id).map_or(0, Vec::len)
    }

    fn lock_pools(&self) -> MutexGuard<'_, HashMap<String, Vec<PooledElement>>> {
        self.pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
