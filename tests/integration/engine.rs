//! Engine lifecycle integration tests
//!
//! Builder defaults and validation, manual and threaded cycles, the
//! container registry and tempo changes.

use crate::helpers::*;
use approx::assert_relative_eq;
use ostinato::prelude::*;
use ostinato::{core::ErrorKind, DriverConfig, Error};
use std::time::Duration;

#[test]
fn test_builder_defaults() {
    let engine = OstinatoEngine::builder().build().unwrap();

    assert_eq!(engine.sample_rate(), 44100);
    assert_eq!(engine.buffer_size(), 944);
    assert_eq!(engine.channels(), 2);
    assert_relative_eq!(engine.bpm(), 120.0);
    assert!(!engine.is_running());
    assert_eq!(engine.driver().sink_name(), "null");
}

#[test]
fn test_builder_rejects_invalid_tempo() {
    let err = OstinatoEngine::builder().bpm(0.0).build().unwrap_err();
    assert!(matches!(
        err,
        Error::Core(ostinato::core::Error::InvalidTempo(_))
    ));
}

#[test]
fn test_builder_rejects_zero_channels() {
    let err = OstinatoEngine::builder().channels(0).build().unwrap_err();
    match err {
        Error::Core(e) => assert_eq!(e.kind(), ErrorKind::Configuration),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_builder_config_replaces_settings() {
    let mut config = DriverConfig::default();
    config.hardware.sample_rate = 48000;
    config.bpm = 90.0;

    let engine = OstinatoEngine::builder()
        .buffer_size(128)
        .config(config)
        .build()
        .unwrap();
    assert_eq!(engine.sample_rate(), 48000);
    assert_eq!(engine.buffer_size(), 944);
    assert_relative_eq!(engine.bpm(), 90.0);
}

#[test]
fn test_locked_device_reported() {
    let (engine, sink) = test_engine();
    sink.lock_device();

    let err = engine.start_manual().unwrap_err();
    assert!(err.is_locked_soundcard());
    assert!(!engine.is_running());
}

#[test]
fn test_manual_cycles() {
    let (engine, sink) = test_engine();
    engine.start_manual().unwrap();
    assert!(engine.is_running());

    assert_eq!(engine.process_cycles(5).unwrap(), 5);
    assert_eq!(engine.cycle(), 5);
    assert_eq!(sink.write_count(), 5);
    assert!(sink
        .writes()
        .iter()
        .all(|w| w.len() == TEST_BUFFER_SIZE * TEST_CHANNELS as usize));

    engine.stop();
    assert!(!engine.is_running());
    assert!(sink.was_drained());
    assert!(sink.was_closed());
    assert_eq!(engine.process_cycles(3).unwrap(), 0);
}

#[test]
fn test_idle_engine_writes_silence() {
    let (engine, sink) = test_engine();
    engine.start_manual().unwrap();
    engine.process_cycles(4).unwrap();

    assert!(sink.writes().iter().flatten().all(|&s| s == 0));
    assert_relative_eq!(engine.peak(), 0.0);
}

#[test]
fn test_stop_twice_is_harmless() {
    let (engine, _sink) = test_engine();
    engine.stop();
    engine.start_manual().unwrap();
    engine.stop();
    engine.stop();
    assert!(!engine.is_running());
}

#[test]
fn test_threaded_run() {
    let engine = OstinatoEngine::builder()
        .sample_rate(8000)
        .buffer_size(64)
        .sink(NullSink::realtime())
        .build()
        .unwrap();

    engine.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(engine.is_running());
    engine.stop();

    let cycles = engine.cycle();
    assert!(cycles > 0, "play thread ran no cycles");
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(engine.cycle(), cycles);
}

#[test]
fn test_container_registry() {
    let (engine, _sink) = test_engine();
    let container = container_of("drums", vec![RecallNode::template(RecallGroup)]);

    engine.register_container(container.clone()).unwrap();
    assert!(matches!(
        engine.register_container(container.clone()),
        Err(Error::DuplicateContainer(name)) if name == "drums"
    ));
    assert_eq!(engine.container_names(), vec!["drums".to_string()]);
    assert!(std::sync::Arc::ptr_eq(
        &engine.container("drums").unwrap(),
        &container
    ));

    let context = context_over_chain(1, TEST_BUFFER_SIZE);
    let playback = engine
        .play_named("drums", &context, SoundScope::Sequencer)
        .unwrap();
    assert_eq!(playback.roots().len(), 1);

    assert!(engine.unregister_container("drums").is_some());
    assert!(matches!(
        engine.play_named("drums", &context, SoundScope::Sequencer),
        Err(Error::UnknownContainer(_))
    ));
}

#[test]
fn test_set_bpm() {
    let (engine, _sink) = test_engine();

    engine.set_bpm(60.0).unwrap();
    assert_relative_eq!(engine.bpm(), 60.0);
    assert_relative_eq!(
        engine.driver().delay(),
        (TEST_SAMPLE_RATE as f64 / TEST_BUFFER_SIZE as f64),
        epsilon = 1e-9
    );

    assert!(engine.set_bpm(1000.0).is_err());
    assert_relative_eq!(engine.bpm(), 60.0);
}
