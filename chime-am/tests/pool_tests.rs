//! Element pooling for overlapping playback

mod helpers;

use chime_am::{ManagerConfig, PlayOptions};
use helpers::*;
use std::collections::HashSet;
use std::time::Duration;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_plays_use_distinct_elements() {
    let fetcher = MockFetcher::new().with_clip("ding.wav", vec![1]);
    let loader = MockElementLoader::new(ms(1000));
    let manager = fallback_manager(&fetcher, &loader);
    manager.preload_sounds(["ding.wav"]).await;
    assert_eq!(manager.pool_len("ding.wav"), 3);

    // Pool of three plus one transient clone
    let plays: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.play("ding.wav", PlayOptions::new()).await })
        })
        .collect();
    for play in plays {
        play.await.unwrap().unwrap();
    }

    let first_batch: HashSet<usize> = loader.log().plays().iter().map(|p| p.element_id).collect();
    assert_eq!(first_batch.len(), 4);
    assert_eq!(manager.pool_len("ding.wav"), 3);

    // Transient clones are not kept: a second batch only reuses pooled members
    let plays: Vec<_> = (0..3)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.play("ding.wav", PlayOptions::new()).await })
        })
        .collect();
    for play in plays {
        play.await.unwrap().unwrap();
    }

    let second_batch: HashSet<usize> = loader.log().plays()[4..]
        .iter()
        .map(|p| p.element_id)
        .collect();
    assert_eq!(second_batch.len(), 3);
    assert!(second_batch.is_subset(&first_batch));
    assert_eq!(manager.pool_len("ding.wav"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_plays_reuse_a_pooled_element() {
    let fetcher = MockFetcher::new().with_clip("ding.wav", vec![1]);
    let loader = MockElementLoader::new(ms(20));
    let manager = fallback_manager(&fetcher, &loader);

    for _ in 0..3 {
        manager.play("ding.wav", PlayOptions::new()).await.unwrap();
    }

    let ids: HashSet<usize> = loader.log().plays().iter().map(|p| p.element_id).collect();
    assert_eq!(ids.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pool_size_from_config() {
    let config = ManagerConfig::from_toml_str("[playback]\npool_size = 1\n").unwrap();
    let fetcher = MockFetcher::new().with_clip("ding.wav", vec![1]);
    let loader = MockElementLoader::new(ms(200));
    let manager = fallback_manager_with(config, &fetcher, &loader);

    let (a, b) = tokio::join!(
        manager.play("ding.wav", PlayOptions::new()),
        manager.play("ding.wav", PlayOptions::new())
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(manager.pool_len("ding.wav"), 1);
    let plays = loader.log().plays();
    assert_eq!(plays.len(), 2);
    assert_ne!(plays[0].element_id, plays[1].element_id);
    assert!(plays.iter().all(|p| p.source == "ding.wav"));
}

#[tokio::test]
async fn test_no_pool_on_precise_backend() {
    let fetcher = MockFetcher::new().with_clip("ding.wav", wav_bytes(100, 48_000, 0.1));
    let loader = MockElementLoader::new(ms(20));
    let factory = ManualEngineFactory::new(48_000);
    let manager = precise_manager(&fetcher, &loader, &factory);

    manager.load("ding.wav").await.unwrap();
    assert_eq!(manager.pool_len("ding.wav"), 0);
}
