//! Playback integration tests
//!
//! Containers instantiated against a recycling context, ticked by the
//! engine and mixed into the captured output.

use crate::helpers::*;
use ostinato::prelude::*;
use ostinato::{BufferSink, BufferSource, CycleInfo, GroupId, RecallId};

#[test]
fn test_stream_plays_on_first_channel() {
    let (engine, sink) = test_engine();
    let container = container_of(
        "stream",
        vec![RecallNode::template(StreamRecycling::new(0, || {
            Box::new(BufferSource::new(vec![0.5; 6]))
        }))],
    );
    let context = context_over_chain(2, TEST_BUFFER_SIZE);

    let playback = engine.play(&container, &context, SoundScope::Wave);
    assert_eq!(playback.status(), PlaybackStatus::Pending);
    assert_eq!(context.recall_id(), Some(playback.recall_id()));
    assert_eq!(context.sound_scope(), Some(SoundScope::Wave));

    engine.start_manual().unwrap();
    engine.process_cycles(1).unwrap();
    assert_eq!(playback.status(), PlaybackStatus::Running);

    engine.process_cycles(1).unwrap();
    assert_eq!(playback.status(), PlaybackStatus::Finished);
    assert!(engine.playbacks().is_empty());
    assert!(container.instances().is_empty());

    engine.process_cycles(2).unwrap();
    let writes = sink.writes();
    let half = pcm(0.5);

    assert_eq!(channel(&writes[1], 0, 2), vec![half; 4]);
    assert_eq!(channel(&writes[1], 1, 2), vec![0; 4]);
    assert_eq!(channel(&writes[2], 0, 2), vec![half, half, 0, 0]);
    assert_eq!(writes[3], vec![0; 8]);
}

#[test]
fn test_slots_mix_by_channel() {
    let (engine, sink) = test_engine();
    let container = container_of(
        "constants",
        vec![
            RecallNode::template(Constant { slot: 0, value: 0.25 }),
            RecallNode::template(Constant { slot: 1, value: 0.5 }),
            RecallNode::template(Constant { slot: 2, value: 0.125 }),
        ],
    );
    let context = context_over_chain(3, TEST_BUFFER_SIZE);
    engine.play(&container, &context, SoundScope::Playback);

    engine.start_manual().unwrap();
    engine.process_cycles(2).unwrap();

    let writes = sink.writes();
    assert_eq!(channel(&writes[1], 0, 2), vec![pcm(0.375); 4]);
    assert_eq!(channel(&writes[1], 1, 2), vec![pcm(0.5); 4]);
    approx::assert_relative_eq!(engine.peak(), 0.5);
}

#[test]
fn test_mix_clamps_at_full_scale() {
    let (engine, sink) = test_engine_with(TEST_BUFFER_SIZE, 1);
    let container = container_of(
        "loud",
        vec![
            RecallNode::template(Constant { slot: 0, value: 0.75 }),
            RecallNode::template(Constant { slot: 1, value: 0.75 }),
        ],
    );
    let context = context_over_chain(2, TEST_BUFFER_SIZE);
    engine.play(&container, &context, SoundScope::Playback);

    engine.start_manual().unwrap();
    engine.process_cycles(2).unwrap();
    assert_eq!(sink.writes()[1], vec![i16::MAX; TEST_BUFFER_SIZE]);
}

#[test]
fn test_two_playbacks_share_nothing() {
    let (engine, _sink) = test_engine();
    let template = RecallNode::template(Constant { slot: 0, value: 0.1 });
    let container = container_of("shared", vec![template]);

    let scope = SoundScope::Playback;
    let first = engine.play(&container, &context_over_chain(1, TEST_BUFFER_SIZE), scope);
    let second = engine.play(&container, &context_over_chain(1, TEST_BUFFER_SIZE), scope);

    assert_ne!(first.recall_id(), second.recall_id());
    assert_ne!(first.recall_id().group_id(), second.recall_id().group_id());
    assert_eq!(container.instances().len(), 2);
    assert_eq!(engine.playbacks().len(), 2);
    assert!(!std::sync::Arc::ptr_eq(&first.roots()[0], &second.roots()[0]));
}

#[test]
fn test_cancel_silences_output() {
    let (engine, sink) = test_engine();
    let template = RecallNode::template(Constant { slot: 0, value: 0.5 });
    let container = container_of("drone", vec![template]);
    let context = context_over_chain(1, TEST_BUFFER_SIZE);
    let playback = engine.play(&container, &context, SoundScope::Playback);

    engine.start_manual().unwrap();
    engine.process_cycles(2).unwrap();
    assert_eq!(playback.status(), PlaybackStatus::Running);

    assert_eq!(engine.cancel(&playback), 1);
    assert_eq!(playback.status(), PlaybackStatus::Cancelled);
    assert!(playback.roots()[0].is_done());
    assert!(container.instances().is_empty());
    assert!(engine.playbacks().is_empty());
    assert_eq!(engine.cancel(&playback), 0);

    engine.process_cycles(2).unwrap();
    let writes = sink.writes();
    assert_eq!(channel(&writes[2], 0, 2), vec![pcm(0.5); 4]);
    assert_eq!(writes[3], vec![0; 8]);
    assert_eq!(playback.cycles(), 2);
}

#[test]
fn test_count_beats_finishes_after_tics() {
    // 60 bpm at 8000 Hz with 2000 frame buffers: one tic every 4 buffers.
    let (engine, _sink) = test_engine_with(2000, 1);
    engine.set_bpm(60.0).unwrap();

    let template = RecallNode::template(CountBeats::new(2, false));
    let container = container_of("count", vec![template]);
    let context = context_over_chain(1, 2000);
    let playback = engine.play(&container, &context, SoundScope::Sequencer);

    engine.start_manual().unwrap();
    engine.process_cycles(4).unwrap();
    assert_eq!(playback.status(), PlaybackStatus::Running);
    let count = playback.roots()[0]
        .with_kind(|beats: &mut CountBeats| beats.count())
        .unwrap();
    assert_eq!(count, 1);

    engine.process_cycles(1).unwrap();
    assert_eq!(playback.status(), PlaybackStatus::Finished);
    assert_eq!(playback.cycles(), 5);
}

#[test]
fn test_record_captures_stream() {
    let (engine, _sink) = test_engine();
    let recorded = BufferSink::new();

    let stream = RecallNode::template(StreamRecycling::new(0, || {
        Box::new(BufferSource::new(vec![0.25, 0.5, 0.75, 1.0]))
    }));
    let record = RecallNode::template(RecordRecycling::new(0, recorded.clone()));
    let container = container_of("tape", vec![stream, record]);

    let context = context_over_chain(1, TEST_BUFFER_SIZE);
    let playback = engine.play(&container, &context, SoundScope::Wave);

    engine.start_manual().unwrap();
    engine.process_cycles(1).unwrap();
    assert_eq!(recorded.frames(), vec![0.25, 0.5, 0.75, 1.0]);

    engine.cancel(&playback);
}

#[test]
fn test_group_children_run_with_parent() {
    let (engine, sink) = test_engine_with(TEST_BUFFER_SIZE, 1);

    let group = RecallNode::template(RecallGroup);
    group.add_child(&RecallNode::template(Constant { slot: 0, value: 0.25 }));
    let container = container_of("group", vec![group]);

    let context = context_over_chain(1, TEST_BUFFER_SIZE);
    let playback = engine.play(&container, &context, SoundScope::Playback);
    let children = playback.roots()[0].children();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].recall_id(), Some(playback.recall_id()));

    engine.start_manual().unwrap();
    engine.process_cycles(2).unwrap();
    assert_eq!(sink.writes()[1], vec![pcm(0.25); TEST_BUFFER_SIZE]);
}

/// Remembers the format its init stages ran with.
#[derive(Debug, Clone)]
struct InitFormat(std::sync::Arc<std::sync::Mutex<Option<CycleInfo>>>);

impl Recall for InitFormat {
    recall_any!("init-format");

    fn run_init_pre(&mut self, cx: &mut StageContext<'_>) {
        *self.0.lock().unwrap() = Some(cx.cycle);
    }
}

#[test]
fn test_late_child_sees_engine_format() {
    let (engine, _sink) = test_engine();
    let container = container_of("late", vec![RecallNode::template(RecallGroup)]);
    let context = context_over_chain(1, TEST_BUFFER_SIZE);
    let playback = engine.play(&container, &context, SoundScope::Playback);

    engine.start_manual().unwrap();
    engine.process_cycles(3).unwrap();

    let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
    let child = RecallNode::instance(
        InitFormat(seen.clone()),
        RecallId::new(GroupId::new(), None),
    );
    playback.roots()[0].add_child(&child);

    let cycle = seen.lock().unwrap().expect("late child was not initialized");
    assert_eq!(cycle.buffer_size, TEST_BUFFER_SIZE);
    assert_eq!(cycle.sample_rate, TEST_SAMPLE_RATE);
    assert_eq!(cycle.channels, TEST_CHANNELS);
    assert_eq!(child.recall_id(), Some(playback.recall_id()));
}
