//! Several ticks of producers and consumers on real worker threads.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use spate_arena::BlockSource;
use spate_core::{CompletionToken, LaneId};
use spate_engine::{EventRegistry, Scheduler};
use spate_test_utils::{engine_config, Impact};

const LANES: u16 = 4;
const TICKS: u64 = 6;
const PER_LANE: u32 = 25;

fn impact(tick: u64, lane: u16, i: u32, source: u16) -> Impact {
    let mut e = Impact::sample(i);
    e.tick = tick;
    e.kind = lane;
    e.flags = source;
    e
}

type Collected = Arc<Mutex<Vec<Impact>>>;

#[test]
fn worker_pool_ticks_deliver_every_event_once() {
    let config = engine_config(LANES).with_rotation_timeout(Duration::from_secs(30));
    let mut registry = EventRegistry::with_worker_pool(config).unwrap();
    let scheduler = Arc::clone(registry.scheduler());
    assert_eq!(scheduler.lane_count(), LANES as usize);

    // Splits its session's lanes over scoped threads.
    let fan_out = registry.register_producer::<Impact>().unwrap();
    // Writes from one pooled task on whichever lane it lands on.
    let single = registry.register_producer::<Impact>().unwrap();
    let consumers: Vec<_> = (0..2)
        .map(|_| registry.register_consumer::<Impact>().unwrap())
        .collect();
    let collected: Vec<Collected> = consumers.iter().map(|_| Collected::default()).collect();

    for tick in 0..=TICKS {
        // Consumers read the previous tick, one task per lane.
        for (consumer, sink) in consumers.iter().zip(&collected) {
            let (readers, dep) = consumer.get_readers(&CompletionToken::completed()).unwrap();
            let tokens: Vec<_> = (0..LANES)
                .map(|lane| {
                    let readers = readers.clone();
                    let sink = Arc::clone(sink);
                    scheduler.schedule(
                        &dep,
                        Box::new(move |_| {
                            let events = readers.read_lane(LaneId(lane)).unwrap();
                            sink.lock().unwrap().extend(events);
                        }),
                    )
                })
                .collect();
            consumer
                .report_completion(CompletionToken::combine(tokens))
                .unwrap();
        }

        if tick == TICKS {
            break;
        }

        let session = fan_out.open_writer().unwrap();
        let token = scheduler.schedule(
            &CompletionToken::completed(),
            Box::new(move |_| {
                let mut session = session;
                let writer = session.writer();
                thread::scope(|s| {
                    for mut lane in writer.into_lanes() {
                        s.spawn(move || {
                            let id = lane.lane().0;
                            for i in 0..PER_LANE {
                                lane.write(impact(tick, id, i, 0)).unwrap();
                            }
                        });
                    }
                });
            }),
        );
        fan_out.report_completion(token).unwrap();

        let session = single.open_writer().unwrap();
        let token = scheduler.schedule(
            &CompletionToken::completed(),
            Box::new(move |lane| {
                let mut session = session;
                for i in 0..PER_LANE {
                    session.write(lane, impact(tick, lane.0, i, 1)).unwrap();
                }
            }),
        );
        single.report_completion(token).unwrap();

        let report = registry.rotate().unwrap();
        assert!(report.is_clean(), "{:?}", report.violations);
        assert_eq!(report.metrics.streams_published, 2);
        assert_eq!(
            report.metrics.events_published,
            (PER_LANE * (u32::from(LANES) + 1)) as usize
        );
    }

    registry.shutdown().unwrap();
    assert_eq!(registry.block_source().live_blocks(), 0);

    for sink in &collected {
        let events = sink.lock().unwrap();
        let mut per_tick: BTreeMap<u64, (usize, usize)> = BTreeMap::new();
        for e in events.iter() {
            let entry = per_tick.entry(e.tick).or_default();
            if e.flags == 0 {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
            assert_eq!(e.entity, e.entity % PER_LANE);
            assert_eq!(e.position[0], e.entity as f32);
        }
        assert_eq!(per_tick.len(), TICKS as usize);
        for (fan, one) in per_tick.values() {
            assert_eq!(*fan, (PER_LANE * u32::from(LANES)) as usize);
            assert_eq!(*one, PER_LANE as usize);
        }
    }
}

#[test]
fn stalled_producer_surfaces_as_rotation_error() {
    let config = engine_config(2).with_rotation_timeout(Duration::from_millis(20));
    let mut registry = EventRegistry::with_worker_pool(config).unwrap();
    let producer = registry.register_producer::<u32>().unwrap();

    let session = producer.open_writer().unwrap();
    let (gate, open) = CompletionToken::pending();
    let token = registry.scheduler().schedule(
        &gate,
        Box::new(move |lane| {
            let mut session = session;
            session.write(lane, 1).unwrap();
        }),
    );
    producer.report_completion(token).unwrap();

    let tick = registry.tick();
    assert!(matches!(
        registry.rotate(),
        Err(spate_engine::RegistryError::RotationStalled { tick: t, .. }) if t == tick
    ));
    assert_eq!(registry.tick(), tick);

    open.complete();
    let report = registry.rotate().unwrap();
    assert_eq!(report.tick, tick);
    assert_eq!(report.metrics.events_published, 1);
}
