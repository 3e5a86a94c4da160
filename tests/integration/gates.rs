//! Gate queue integration tests
//!
//! Every cycle hands a fresh gate through the queue. These tests watch the
//! queue from outside while the engine runs.

use crate::helpers::*;
use ostinato::core::{Error as CoreError, Gate};
use ostinato::Error;
use std::time::Duration;

#[test]
fn test_queue_depth_stays_at_one() {
    let (engine, _sink) = test_engine();
    let queue = engine.driver().gate_queue().clone();
    assert!(queue.is_empty());

    engine.start_manual().unwrap();
    for _ in 0..10 {
        engine.process_cycles(1).unwrap();
        assert_eq!(queue.len(), 1);
    }
}

#[test]
fn test_head_gate_is_ready_after_cycle() {
    let (engine, _sink) = test_engine();
    engine.start_manual().unwrap();

    engine.process_cycles(1).unwrap();
    let first = engine.driver().gate_queue().head().unwrap();
    assert!(first.is_ready());

    engine.process_cycles(1).unwrap();
    let second = engine.driver().gate_queue().head().unwrap();
    assert_ne!(first.id(), second.id());
    assert!(second.is_ready());
}

/// An outside gate queued between cycles holds the next cycle until its
/// owner pops it.
#[test]
fn test_external_gate_interleaves_with_cycles() {
    let (engine, _sink) = test_engine();
    engine.start_manual().unwrap();
    engine.process_cycles(1).unwrap();

    let gate = Gate::new();
    engine.driver().submit_push(gate.clone()).unwrap();
    assert!(!gate.wait_ready_timeout(Duration::from_millis(20)));

    std::thread::scope(|s| {
        let cycle = s.spawn(|| engine.process_cycles(1));
        assert!(gate.wait_ready_timeout(Duration::from_secs(1)));
        engine.driver().submit_pop().unwrap();
        assert_eq!(cycle.join().unwrap().unwrap(), 1);
    });

    assert!(gate.wait_popped());
    assert_eq!(engine.driver().gate_queue().len(), 1);
}

#[test]
fn test_shutdown_stops_cycles() {
    let (engine, sink) = test_engine();
    engine.start_manual().unwrap();
    engine.process_cycles(2).unwrap();

    engine.driver().shutdown();
    assert!(engine.driver().gate_queue().is_shutdown());
    assert!(sink.was_closed());
    assert!(matches!(
        engine.process_cycles(1),
        Err(Error::Core(CoreError::Shutdown))
    ));
    assert!(matches!(
        engine.driver().submit_pop(),
        Err(CoreError::Shutdown)
    ));
}

/// A pop requested while one gate is queued completes only once a
/// successor arrives.
#[test]
fn test_pop_waits_for_successor() {
    let (engine, _sink) = test_engine();
    engine.start_manual().unwrap();
    engine.process_cycles(1).unwrap();

    let queue = engine.driver().gate_queue().clone();
    let head = queue.head().unwrap();
    engine.driver().submit_pop().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(head.is_active());
    assert_eq!(queue.len(), 1);

    let gate = Gate::new();
    engine.driver().submit_push(gate.clone()).unwrap();
    assert!(gate.wait_ready_timeout(Duration::from_secs(1)));
    assert!(head.wait_popped());
    assert_eq!(queue.head().unwrap().id(), gate.id());

    assert_eq!(engine.process_cycles(1).unwrap(), 1);
    assert!(gate.wait_popped());
}

#[test]
fn test_push_after_shutdown_does_not_block() {
    let (engine, _sink) = test_engine();
    engine.driver().shutdown();

    let gate = Gate::new();
    engine.driver().gate_queue().push(gate.clone());
    assert!(!gate.wait_ready());
    assert!(gate.is_released());
}
