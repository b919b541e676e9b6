use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use task_queue_client::{BrokerClient, BrokerConfig, InMemoryBroker, InMemoryManager, ManagerConfig};
use task_queue_core::TaskStatus;
use task_queue_worker::handler::EchoHandler;
use task_queue_worker::{WorkerApplication, WorkerApplicationConfig, WorkerError, WorkerState};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    broker: InMemoryBroker,
    manager: InMemoryManager,
    app: WorkerApplication,
}

fn harness() -> Harness {
    let broker = InMemoryBroker::new();
    let manager = InMemoryManager::new();
    let config = WorkerApplicationConfig::new(
        "lifecycle-worker",
        BrokerConfig::InMemory,
        ManagerConfig::InMemory,
    );
    let app = WorkerApplication::with_clients(
        config,
        Box::new(broker.clone()),
        Box::new(manager.clone()),
    );
    Harness { broker, manager, app }
}

async fn wait_for_loops(broker: &InMemoryBroker, count: usize) {
    tokio::time::timeout(WAIT, async {
        while broker.subscriptions().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listen loops did not start");
}

#[tokio::test]
async fn test_one_loop_per_registered_kind() {
    let Harness { broker, manager, app } = harness();
    let app = app
        .task("a", EchoHandler)
        .task("b", EchoHandler)
        .task("c", EchoHandler);
    let mut state = app.subscribe_state();

    for kind in ["a", "b", "c"] {
        broker.close_queue(kind);
    }
    app.entrypoint(CancellationToken::new()).await.unwrap();

    let mut subscribed = broker.subscriptions();
    subscribed.sort();
    assert_eq!(subscribed, vec!["a", "b", "c"]);
    assert_eq!(manager.registration_count(), 1);
    assert_eq!(*state.borrow_and_update(), WorkerState::Unregistered);
}

#[tokio::test]
async fn test_running_state_reports_loop_count() {
    let Harness { broker, app, .. } = harness();
    let app = app.task("a", EchoHandler).task("b", EchoHandler);
    let mut state = app.subscribe_state();

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(app.entrypoint(cancel.clone()));

    tokio::time::timeout(WAIT, state.wait_for(|s| matches!(s, WorkerState::Running { .. })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*state.borrow(), WorkerState::Running { loops: 2 });

    wait_for_loops(&broker, 2).await;
    cancel.cancel();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_two_kinds_fifo_within_each() {
    let Harness { broker, manager, app } = harness();
    let app = app.task("a", EchoHandler).task("b", EchoHandler);

    let x1 = broker.publish("a", b"x1".to_vec()).unwrap();
    let x2 = broker.publish("a", b"x2".to_vec()).unwrap();
    let y1 = broker.publish("b", b"y1".to_vec()).unwrap();
    broker.close_queue("a");
    broker.close_queue("b");

    app.entrypoint(CancellationToken::new()).await.unwrap();

    let reports = manager.reports();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.status == TaskStatus::Completed));

    let a: Vec<_> = reports.iter().filter(|r| r.kind == "a").map(|r| r.task_id).collect();
    assert_eq!(a, vec![x1, x2]);

    let b = reports.iter().find(|r| r.kind == "b").unwrap();
    assert_eq!(b.task_id, y1);
    assert_eq!(b.output.as_deref(), Some(&b"y1"[..]));
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_the_loop() {
    let Harness { broker, manager, mut app } = harness();
    app.register_fn("a", |input: Vec<u8>| async move {
        if input == b"bad" {
            Err("rejected".to_string())
        } else {
            Ok(input)
        }
    });

    broker.publish("a", b"bad".to_vec()).unwrap();
    broker.publish("a", b"good".to_vec()).unwrap();
    broker.close_queue("a");

    app.entrypoint(CancellationToken::new()).await.unwrap();

    let reports = manager.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status, TaskStatus::Failed);
    assert_eq!(reports[0].output, None);
    assert_eq!(reports[0].error.as_deref(), Some("rejected"));
    assert_eq!(reports[1].status, TaskStatus::Completed);
    assert_eq!(reports[1].output.as_deref(), Some(&b"good"[..]));
}

#[tokio::test]
async fn test_panicking_handler_is_reported_failed() {
    let Harness { broker, manager, mut app } = harness();
    app.register_fn("a", |input: Vec<u8>| async move {
        if input.is_empty() {
            panic!("empty input");
        }
        Ok::<_, String>(input)
    });

    broker.publish("a", vec![]).unwrap();
    broker.publish("a", b"ok".to_vec()).unwrap();
    broker.close_queue("a");

    app.entrypoint(CancellationToken::new()).await.unwrap();

    let reports = manager.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].status, TaskStatus::Failed);
    assert!(reports[0].error.as_deref().unwrap().contains("empty input"));
    assert_eq!(reports[1].status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_last_registration_wins() {
    let Harness { broker, manager, mut app } = harness();
    app.register_fn("a", |_input| async { Ok::<_, String>(b"first".to_vec()) });
    app.register_fn("a", |_input| async { Ok::<_, String>(b"second".to_vec()) });

    broker.publish("a", vec![]).unwrap();
    broker.close_queue("a");
    app.entrypoint(CancellationToken::new()).await.unwrap();

    let reports = manager.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].output.as_deref(), Some(&b"second"[..]));
}

#[tokio::test]
async fn test_cleanup_runs_once_on_natural_completion() {
    let Harness { broker, manager, app } = harness();
    let app = app.task("a", EchoHandler);
    broker.close_queue("a");

    app.entrypoint(CancellationToken::new()).await.unwrap();

    assert_eq!(manager.unregistration_count(), 1);
    assert_eq!(broker.disconnect_count(), 1);
    assert!(manager.live_workers().is_empty());
}

#[tokio::test]
async fn test_cleanup_runs_once_on_cancellation() {
    let Harness { broker, manager, app } = harness();
    let app = app.task("a", EchoHandler).task("b", EchoHandler);

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(app.entrypoint(cancel.clone()));
    wait_for_loops(&broker, 2).await;

    cancel.cancel();
    tokio::time::timeout(WAIT, worker).await.unwrap().unwrap().unwrap();

    assert_eq!(manager.unregistration_count(), 1);
    assert_eq!(broker.disconnect_count(), 1);
    assert!(!broker.is_connected());
}

#[tokio::test]
async fn test_cleanup_runs_once_when_a_loop_fails() {
    let Harness { broker, manager, app } = harness();
    let app = app.task("a", EchoHandler).task("b", EchoHandler);

    // Someone else already owns the subscription to "b"
    let mut squatter = broker.clone();
    squatter.connect().await.unwrap();
    let _taken = squatter.listen("b").await.unwrap();

    let result = tokio::time::timeout(WAIT, app.entrypoint(CancellationToken::new()))
        .await
        .unwrap();

    assert!(matches!(result, Err(WorkerError::Listener { kind, .. }) if kind == "b"));
    assert_eq!(manager.unregistration_count(), 1);
    assert_eq!(broker.disconnect_count(), 1);
}

#[tokio::test]
async fn test_refused_registration_starts_no_loops() {
    let Harness { broker, manager, app } = harness();
    let app = app.task("a", EchoHandler);
    manager.refuse_registration(true);

    let result = app.entrypoint(CancellationToken::new()).await;

    assert!(matches!(result, Err(WorkerError::Registration(_))));
    assert!(broker.subscriptions().is_empty());
    assert_eq!(broker.connect_count(), 0);
    assert_eq!(manager.unregistration_count(), 0);
}

#[tokio::test]
async fn test_refused_broker_releases_identity() {
    let Harness { broker, manager, app } = harness();
    let app = app.task("a", EchoHandler);
    broker.refuse_connections(true);

    let result = app.entrypoint(CancellationToken::new()).await;

    assert!(matches!(result, Err(WorkerError::Broker(_))));
    assert_eq!(manager.registration_count(), 1);
    assert_eq!(manager.unregistration_count(), 1);
    assert!(manager.live_workers().is_empty());
    assert!(broker.subscriptions().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_registration() {
    let Harness { broker, manager, app } = harness();
    let app = app.task("a", EchoHandler);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = app.entrypoint(cancel).await;

    assert!(matches!(result, Err(WorkerError::Cancelled)));
    assert_eq!(manager.registration_count(), 0);
    assert_eq!(broker.connect_count(), 0);
}

#[tokio::test]
async fn test_status_report_failure_keeps_loop_alive() {
    let Harness { broker, manager, mut app } = harness();
    let executed = Arc::new(AtomicUsize::new(0));
    let counter = executed.clone();
    app.register_fn("a", move |input| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(input)
        }
    });
    manager.refuse_status_updates(true);

    broker.publish("a", b"lost".to_vec()).unwrap();
    let worker = tokio::spawn(app.entrypoint(CancellationToken::new()));

    tokio::time::timeout(WAIT, async {
        while executed.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    manager.refuse_status_updates(false);
    let kept = broker.publish("a", b"kept".to_vec()).unwrap();
    assert!(manager.wait_for_reports(1, WAIT).await);

    broker.close_queue("a");
    tokio::time::timeout(WAIT, worker).await.unwrap().unwrap().unwrap();

    let reports = manager.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].task_id, kept);
    assert_eq!(executed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_during_handler_never_duplicates_report() {
    let Harness { broker, manager, mut app } = harness();
    let started = Arc::new(AtomicUsize::new(0));
    let counter = started.clone();
    app.register_fn("a", move |input| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, String>(input)
        }
    });

    broker.publish("a", b"slow".to_vec()).unwrap();

    let cancel = CancellationToken::new();
    let worker = tokio::spawn(app.entrypoint(cancel.clone()));

    tokio::time::timeout(WAIT, async {
        while started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(WAIT, worker).await.unwrap().unwrap().unwrap();

    assert!(manager.reports().len() <= 1);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(manager.unregistration_count(), 1);
}
