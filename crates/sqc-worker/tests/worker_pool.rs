// SPDX-License-Identifier: Apache-2.0

mod worker_support;

use sqc_worker::{
    creation_event, AckMode, BrokerConnector, BrokerError, InMemoryBroker, MessageSource,
    ShutdownCause, ShutdownTrigger, Worker, WorkerConfig, WorkerState, WorkerTimings,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use worker_support::{wait_until, Harness};

const FAST: WorkerTimings = WorkerTimings {
    consume_wait: Duration::from_millis(10),
    reconnect_delay: Duration::from_millis(10),
};

#[test]
fn two_workers_drain_the_queue_then_stop_on_signal() {
    let harness = Arc::new(Harness::new(AckMode::AfterResponse));
    let broker = InMemoryBroker::new();
    let ids: Vec<String> = (0..10).map(|i| format!("req-{i}")).collect();
    for id in &ids {
        harness.submit_pdb(id);
        broker.publish(creation_event(id));
    }

    let config = WorkerConfig {
        workers: 2,
        consume_wait: FAST.consume_wait,
        reconnect_delay: FAST.reconnect_delay,
        ..WorkerConfig::default()
    };
    let connector: Arc<dyn BrokerConnector> = Arc::new(broker.clone());
    let pool = sqc_worker::spawn_pool(&config, connector, Arc::clone(&harness.jobs))
        .expect("spawn pool");
    assert_eq!(pool.len(), 2);

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = {
        let stop = Arc::clone(&stop);
        let harness = Arc::clone(&harness);
        let ids = ids.clone();
        thread::spawn(move || {
            let drained = wait_until(Duration::from_secs(30), || {
                ids.iter().all(|id| harness.has_response(id))
            });
            stop.store(true, Ordering::SeqCst);
            drained
        })
    };

    let cause = pool.supervise(&stop, Duration::from_millis(10));
    assert!(watcher.join().expect("watcher"), "queue was not drained");
    assert_eq!(cause, ShutdownCause::Signal);
    assert_eq!(cause.exit_code(), 0);

    for id in &ids {
        assert!(!harness.gateway.request_exists(id).expect("stat"), "{id}");
        let response = harness
            .gateway
            .fetch_response(id)
            .expect("result")
            .into_response()
            .expect("decode");
        assert!(response.error().is_none(), "{id}: {:?}", response.error());
    }
    assert_eq!(broker.acked_count(), 10);
    assert_eq!(broker.queued(), 0);
    assert_eq!(broker.connections(), 2);
}

#[test]
fn worker_reconnects_after_refused_connections() {
    let harness = Arc::new(Harness::new(AckMode::BeforeProcessing));
    let broker = InMemoryBroker::new();
    broker.refuse_next_connections(2);
    harness.submit_pdb("1abc");
    broker.publish(creation_event("1abc"));

    let trigger = ShutdownTrigger::new();
    let worker = Worker::new(
        "sqc-worker-0",
        Arc::new(broker.clone()),
        Arc::clone(&harness.jobs),
        trigger.token(),
        FAST,
    );
    assert_eq!(worker.state(), WorkerState::Idle);
    let handle = thread::spawn(move || worker.run());

    assert!(wait_until(Duration::from_secs(30), || harness.has_response("1abc")));
    trigger.trigger();
    let report = handle.join().expect("worker thread");

    assert_eq!(report.connection_failures, 2);
    assert_eq!(report.processed, 1);
    assert_eq!(report.responded, 1);
    assert_eq!(
        report.transitions,
        vec![
            WorkerState::Idle,
            WorkerState::Connected,
            WorkerState::Consuming,
            WorkerState::Processing,
            WorkerState::Consuming,
            WorkerState::Stopped,
        ]
    );
    assert_eq!(broker.connections(), 1);
    assert_eq!(broker.acked_count(), 1);
}

#[test]
fn unacked_delivery_is_redelivered_to_the_next_session() {
    let broker = InMemoryBroker::new();
    broker.publish(creation_event("1abc"));

    let first = broker.consume(&mut |source: &mut dyn MessageSource| {
        let delivery = source
            .next_delivery(Duration::from_millis(50))?
            .expect("delivery");
        assert!(!delivery.redelivered);
        Err(BrokerError::Closed("connection lost".to_string()))
    });
    assert!(first.is_err());
    assert_eq!(broker.queued(), 1);

    broker
        .consume(&mut |source: &mut dyn MessageSource| {
            let delivery = source
                .next_delivery(Duration::from_millis(50))?
                .expect("redelivery");
            assert!(delivery.redelivered);
            source.ack(delivery.tag)
        })
        .expect("second session");
    assert_eq!(broker.acked_count(), 1);
}
