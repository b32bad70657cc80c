use std::time::{Duration, Instant};

use hostvm_audio::{AudioConfig, AudioEngine, AudioFormat, CaptureSink, Pacing};
use hostvm_types::EngineState;

fn fast_config() -> AudioConfig {
    AudioConfig {
        format: AudioFormat {
            period_samples: 8,
            ..AudioFormat::default()
        },
        pacing: Pacing::FixedMillis(1),
    }
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn blocks_play_in_queue_order() {
    let sink = CaptureSink::new();
    let mut engine = AudioEngine::new();
    engine
        .initialize_with_sink(&fast_config(), Box::new(sink.clone()))
        .unwrap();

    let a = vec![1i16; 4];
    let b = vec![2i16; 6];
    let c = vec![3i16; 2];
    engine.queue_audio(&a).unwrap();
    engine.queue_audio(&b).unwrap();
    engine.queue_audio(&c).unwrap();
    engine.play().unwrap();

    wait_until("three audible blocks", || sink.audible_blocks().len() >= 3);
    assert_eq!(sink.audible_blocks(), vec![a, b, c]);

    // The first thing played is the seed: one period of silence.
    assert_eq!(sink.blocks()[0], vec![0i16; 8]);

    wait_until("an underrun", || engine.stats().underruns > 0);
    engine.cleanup();
}

#[test]
fn concurrent_enqueue_preserves_order() {
    const BLOCKS: i16 = 200;

    let sink = CaptureSink::new();
    let mut engine = AudioEngine::new();
    engine
        .initialize_with_sink(&fast_config(), Box::new(sink.clone()))
        .unwrap();
    engine.play().unwrap();

    for i in 1..=BLOCKS {
        engine.queue_audio(&[i, i]).unwrap();
        if i % 16 == 0 {
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    wait_until("all blocks played", || {
        sink.audible_blocks().len() == BLOCKS as usize
    });
    let played: Vec<i16> = sink.audible_blocks().iter().map(|b| b[0]).collect();
    let expected: Vec<i16> = (1..=BLOCKS).collect();
    assert_eq!(played, expected);
    assert_eq!(engine.lifecycle(), EngineState::Running);
}

#[test]
fn stop_silences_the_stream() {
    let sink = CaptureSink::new();
    let mut engine = AudioEngine::new();
    engine
        .initialize_with_sink(
            &AudioConfig {
                pacing: Pacing::FixedMillis(50),
                ..fast_config()
            },
            Box::new(sink.clone()),
        )
        .unwrap();
    for _ in 0..100 {
        engine.queue_audio(&[9, 9]).unwrap();
    }
    engine.play().unwrap();
    engine.stop().unwrap();
    assert_eq!(engine.stats().queued, 0);

    std::thread::sleep(Duration::from_millis(150));
    // At most the block already in flight when stop was called may have been played.
    assert!(sink.audible_blocks().len() <= 1);

    engine.cleanup();
    engine.cleanup();
    assert_eq!(engine.lifecycle(), EngineState::Uninitialized);
}
