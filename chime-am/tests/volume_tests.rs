//! Global volume and mute on both backends

mod helpers;

use chime_am::{ManagerConfig, PlayOptions};
use helpers::*;
use std::time::Duration;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[tokio::test(start_paused = true)]
async fn test_element_volume_is_global_times_per_play() {
    let fetcher = MockFetcher::new().with_clip("tick.wav", vec![1]);
    let loader = MockElementLoader::new(ms(10));
    let manager = fallback_manager(&fetcher, &loader);

    manager.set_volume(0.5);
    manager
        .play("tick.wav", PlayOptions::new().with_volume(0.6))
        .await
        .unwrap();

    assert!(approx(loader.log().plays()[0].volume, 0.3));
}

#[tokio::test(start_paused = true)]
async fn test_mute_silences_and_unmute_restores() {
    let fetcher = MockFetcher::new().with_clip("tick.wav", vec![1]);
    let loader = MockElementLoader::new(ms(10));
    let manager = fallback_manager(&fetcher, &loader);
    manager.set_volume(0.8);

    manager.set_mute(true);
    assert!(manager.is_muted());
    assert_eq!(manager.effective_gain(), 0.0);
    manager.play("tick.wav", PlayOptions::new()).await.unwrap();

    manager.set_mute(false);
    assert!(approx(manager.volume(), 0.8));
    manager.play("tick.wav", PlayOptions::new()).await.unwrap();

    let plays = loader.log().plays();
    assert_eq!(plays[0].volume, 0.0);
    assert!(approx(plays[1].volume, 0.8));
}

#[test]
fn test_volume_clamped_and_nan_ignored() {
    let fetcher = MockFetcher::new();
    let loader = MockElementLoader::new(ms(10));
    let manager = fallback_manager(&fetcher, &loader);

    assert_eq!(manager.set_volume(1.5), 1.0);
    assert_eq!(manager.set_volume(-3.0), 0.0);
    manager.set_volume(0.4);
    assert!(approx(manager.set_volume(f32::NAN), 0.4));
    assert!(approx(manager.volume(), 0.4));
}

#[tokio::test(start_paused = true)]
async fn test_per_play_volume_is_clamped() {
    let fetcher = MockFetcher::new().with_clip("tick.wav", vec![1]);
    let loader = MockElementLoader::new(ms(10));
    let manager = fallback_manager(&fetcher, &loader);

    manager
        .play("tick.wav", PlayOptions::new().with_volume(4.0))
        .await
        .unwrap();
    manager
        .play("tick.wav", PlayOptions::new().with_volume(-1.0))
        .await
        .unwrap();

    let plays = loader.log().plays();
    assert_eq!(plays[0].volume, 1.0);
    assert_eq!(plays[1].volume, 0.0);
}

#[tokio::test]
async fn test_initial_volume_and_mute_from_config() {
    let config = ManagerConfig::from_toml_str("[playback]\nvolume = 0.25\nmuted = true\n").unwrap();
    let fetcher = MockFetcher::new();
    let loader = MockElementLoader::new(ms(10));
    let manager = fallback_manager_with(config, &fetcher, &loader);

    assert!(approx(manager.volume(), 0.25));
    assert!(manager.is_muted());
    assert_eq!(manager.effective_element_volume(1.0), 0.0);
}

#[tokio::test]
async fn test_precise_master_gain_tracks_volume_and_mute() {
    let fetcher = MockFetcher::new();
    let loader = MockElementLoader::new(ms(10));
    let factory = ManualEngineFactory::new(48_000);
    let manager = precise_manager(&fetcher, &loader, &factory);

    manager.set_volume(0.6);
    manager.init().await;
    let master = factory.graph().master_gain().clone();
    assert!(approx(master.value(), 0.6));

    manager.set_mute(true);
    assert_eq!(master.value(), 0.0);

    manager.set_volume(0.3);
    assert_eq!(master.value(), 0.0);

    manager.set_mute(false);
    assert!(approx(master.value(), 0.3));
}

#[tokio::test(start_paused = true)]
async fn test_precise_output_level_and_live_mute() {
    let fetcher = MockFetcher::new().with_clip("tone.wav", wav_bytes(4800, 48_000, 0.5));
    let loader = MockElementLoader::new(ms(10));
    let factory = ManualEngineFactory::new(48_000);
    let manager = precise_manager(&fetcher, &loader, &factory);
    manager.preload_sounds(["tone.wav"]).await;
    manager.set_volume(0.5);

    let graph = factory.graph();
    let playback = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .play("tone.wav", PlayOptions::new().with_volume(0.5))
                .await
        })
    };
    wait_for_sources(&graph, 1).await;

    let left = render_left(&graph, 100);
    assert!(approx(left[0], 0.125));

    // Mute applies to a clip that is already playing
    manager.set_mute(true);
    let left = render_left(&graph, 100);
    assert!(left.iter().all(|&s| s == 0.0));

    manager.set_mute(false);
    render_left(&graph, 4800);
    playback.await.unwrap().unwrap();
}
