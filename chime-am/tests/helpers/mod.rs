//! Test helper modules for chime-am integration tests
//!
//! - mocks: fetcher, media elements and engine factories with recording
//! - audio: in-memory WAV generation

pub mod audio;
pub mod mocks;

pub use audio::wav_bytes;
pub use mocks::{
    render_left, wait_for_sources, FailingEngineFactory, ManualEngineFactory, MockElementLoader,
    MockFetcher, PlayBehavior, PlayLog, PlayRecord,
};

use chime_am::{ManagerConfig, SoundManager};
use std::sync::Arc;

/// Element-backend manager over the given mocks
#[allow(dead_code)]
pub fn fallback_manager(fetcher: &Arc<MockFetcher>, loader: &Arc<MockElementLoader>) -> SoundManager {
    fallback_manager_with(ManagerConfig::default(), fetcher, loader)
}

#[allow(dead_code)]
pub fn fallback_manager_with(
    config: ManagerConfig,
    fetcher: &Arc<MockFetcher>,
    loader: &Arc<MockElementLoader>,
) -> SoundManager {
    SoundManager::builder(config)
        .fetcher(fetcher.clone())
        .element_loader(loader.clone())
        .without_precise_engine()
        .build()
        .expect("manager should build")
}

/// Precise-backend manager whose graph is driven by the test
#[allow(dead_code)]
pub fn precise_manager(
    fetcher: &Arc<MockFetcher>,
    loader: &Arc<MockElementLoader>,
    factory: &Arc<ManualEngineFactory>,
) -> SoundManager {
    SoundManager::builder(ManagerConfig::default())
        .fetcher(fetcher.clone())
        .element_loader(loader.clone())
        .engine_factory(factory.clone())
        .build()
        .expect("manager should build")
}
