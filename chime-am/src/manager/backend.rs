//! Backend selection
//!
//! Selection happens once per manager. The precise engine is preferred; if
//! it cannot be constructed the manager runs on media elements for the rest
//! of its life.

use crate::audio::engine::{EngineFactory, PreciseEngine};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Which backend a manager (or a cached handle) uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Precise,
    Fallback,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Precise => write!(f, "precise"),
            BackendKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// The selected backend
#[derive(Debug, Clone)]
pub enum Backend {
    Precise(Arc<PreciseEngine>),
    Fallback,
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Precise(_) => BackendKind::Precise,
            Backend::Fallback => BackendKind::Fallback,
        }
    }

    pub fn engine(&self) -> Option<&Arc<PreciseEngine>> {
        match self {
            Backend::Precise(engine) => Some(engine),
            Backend::Fallback => None,
        }
    }
}

/// Try to build the precise engine; downgrade to the fallback on any failure.
///
/// A suspended engine gets one resume attempt. If that fails the engine is
/// still used: it stays silent until the output starts delivering audio.
pub async fn select_backend(factory: Option<Arc<dyn EngineFactory>>) -> Backend {
    let Some(factory) = factory else {
        info!("Precise engine disabled, using media element backend");
        return Backend::Fallback;
    };

    let created = tokio::task::spawn_blocking(move || {
        let engine = factory.create()?;
        if !engine.is_running() {
            info!("Precise engine created suspended, attempting resume");
            if let Err(e) = engine.resume() {
                warn!("Failed to resume precise engine: {}", e);
            }
        }
        Ok::<_, crate::error::Error>(engine)
    })
    .await;

    match created {
        Ok(Ok(engine)) => {
            info!(
                "Using precise backend ({}, {} Hz)",
                engine.output_name(),
                engine.graph().sample_rate()
            );
            Backend::Precise(Arc::new(engine))
        }
        Ok(Err(e)) => {
            warn!("Precise engine unavailable, falling back to media elements: {}", e);
            Backend::Fallback
        }
        Err(e) => {
            warn!("Precise engine construction panicked, falling back to media elements: {}", e);
            Backend::Fallback
        }
    }
}
