//! Misuse is reported, never undefined.

use std::sync::Arc;

use spate_arena::{BlockSource, StreamError};
use spate_core::{CompletionToken, HandleId, LaneId};
use spate_engine::{
    dispose_after, EventRegistry, ImmediateScheduler, ProtocolError, RegistryError, Violation,
};
use spate_test_utils::fixtures::{fill_lane, stream};
use spate_test_utils::{engine_config, small_stream_config, ManualScheduler};

fn registry() -> EventRegistry {
    EventRegistry::new(engine_config(2), Arc::new(ImmediateScheduler)).unwrap()
}

#[test]
fn second_writer_in_a_tick_is_rejected() {
    let mut registry = registry();
    let producer = registry.register_producer::<u32>().unwrap();
    let _session = producer.open_writer().unwrap();
    assert_eq!(
        producer.open_writer().unwrap_err(),
        ProtocolError::WriterAlreadyOpen {
            handle: producer.id()
        }
    );
}

#[test]
fn session_left_open_across_rotation_is_discarded() {
    let mut registry = registry();
    let producer = registry.register_producer::<u32>().unwrap();
    let consumer = registry.register_consumer::<u32>().unwrap();

    let mut session = producer.open_writer().unwrap();
    session.write(LaneId(0), 1).unwrap();
    producer
        .report_completion(CompletionToken::completed())
        .unwrap();

    let report = registry.rotate().unwrap();
    assert!(matches!(
        report.violations.as_slice(),
        [Violation::WriterNotReturned { handle, .. }] if *handle == producer.id()
    ));
    assert!(!consumer.has_readers());

    // The stale session's stream never reaches a consumer.
    session.write(LaneId(1), 2).unwrap();
    drop(session);
    assert_eq!(registry.block_source().live_blocks(), 0);
    let report = registry.rotate().unwrap();
    assert_eq!(report.metrics.streams_published, 0);
}

#[cfg(feature = "checks")]
#[test]
fn unbalanced_reports_are_rejected_and_recorded() {
    let mut registry = registry();
    let producer = registry.register_producer::<u32>().unwrap();
    let consumer = registry.register_consumer::<u32>().unwrap();

    assert!(matches!(
        producer.report_completion(CompletionToken::completed()),
        Err(ProtocolError::UnbalancedCompletion { opened: 0, reported: 0, .. })
    ));

    // Opened but never reported: published anyway, with a violation.
    producer.open_writer().unwrap().close();
    let report = registry.rotate().unwrap();
    assert_eq!(report.metrics.streams_published, 1);
    assert!(matches!(
        report.violations.as_slice(),
        [Violation::ProducerUnbalanced { opened: 1, reported: 0, .. }]
    ));

    // Read without reporting: the next rotation records it.
    let (readers, _) = consumer.get_readers(&CompletionToken::completed()).unwrap();
    assert!(matches!(
        consumer.get_readers(&CompletionToken::completed()),
        Err(ProtocolError::ReadSessionOpen { requested: 1, reported: 0, .. })
    ));
    drop(readers);
    let report = registry.rotate().unwrap();
    assert!(matches!(
        report.violations.as_slice(),
        [Violation::ConsumerUnbalanced { requested: 1, reported: 0, .. }]
    ));
    assert!(report.disposal.is_complete());
    assert_eq!(registry.block_source().live_blocks(), 0);
}

#[test]
fn deregistering_a_writing_producer_discards_its_stream() {
    let mut registry = registry();
    let producer = registry.register_producer::<u32>().unwrap();
    let consumer = registry.register_consumer::<u32>().unwrap();

    let mut session = producer.open_writer().unwrap();
    session.write(LaneId(0), 3).unwrap();
    registry.deregister_producer(producer).unwrap();
    registry.deregister_consumer(consumer).unwrap();
    let container = registry.container::<u32>().unwrap();
    assert_eq!(container.producer_count(), 0);
    assert_eq!(container.consumer_count(), 0);

    drop(session);
    assert_eq!(registry.block_source().live_blocks(), 0);
    let report = registry.rotate().unwrap();
    assert_eq!(report.metrics.streams_published, 0);
}

#[test]
fn registry_refuses_work_after_shutdown() {
    let mut registry = registry();
    let producer = registry.register_producer::<u32>().unwrap();
    registry.shutdown().unwrap();
    registry.shutdown().unwrap();

    assert_eq!(registry.rotate().unwrap_err(), RegistryError::ShutDown);
    assert!(matches!(
        registry.register_consumer::<u32>(),
        Err(RegistryError::ShutDown)
    ));
    assert!(matches!(
        producer.open_writer(),
        Err(ProtocolError::HandleNotRegistered { handle: HandleId(0) })
    ));
}

#[test]
fn scheduler_with_more_lanes_than_streams_is_rejected() {
    let err = EventRegistry::new(engine_config(1), Arc::new(ManualScheduler::new(3))).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Config(spate_engine::ConfigError::WorkersExceedLanes {
            workers: 3,
            lanes: 1
        })
    ));
}

#[cfg(feature = "checks")]
#[test]
fn leaving_a_lane_early_is_reported_by_the_reader() {
    let (mut s, _source) = stream(&small_stream_config(1));
    fill_lane(&mut s, LaneId(0), &[1u32, 2, 3]);
    let mut reader = s.reader();
    reader.begin_lane(LaneId(0)).unwrap();
    reader.read::<u32>().unwrap();
    assert_eq!(
        reader.end_lane(),
        Err(StreamError::LaneNotDrained {
            lane: LaneId(0),
            remaining: 2
        })
    );
}

#[test]
fn manual_disposal_waits_for_its_dependency() {
    let scheduler = ManualScheduler::new(1);
    let (mut s, source) = stream(&small_stream_config(1));
    fill_lane(&mut s, LaneId(0), &[7u64; 20]);
    assert!(source.live_blocks() > 0);

    let (readers_done, completer) = CompletionToken::pending();
    let disposed = dispose_after(vec![Arc::new(s)], &readers_done, &scheduler);
    assert_eq!(scheduler.run_ready(), 0);
    assert!(source.live_blocks() > 0);

    completer.complete();
    assert_eq!(scheduler.run_ready(), 1);
    assert!(disposed.is_complete());
    assert_eq!(source.live_blocks(), 0);
}
