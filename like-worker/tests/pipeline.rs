use std::time::Duration;

use like_common::event::EventKey;
use like_common::health::HealthRegistry;
use like_common::mock::{MemoryConnector, MemoryCounterStore, MemoryQueue};
use like_common::queue::LikeQueue;
use like_worker::backoff::Backoff;
use like_worker::worker::LikeWorker;

const BACKOFF: Duration = Duration::from_millis(20);

fn key(raw: &str) -> EventKey {
    raw.parse().unwrap()
}

fn worker(
    queue: &MemoryQueue,
    connector: &MemoryConnector,
) -> LikeWorker<MemoryQueue, MemoryConnector> {
    let registry = HealthRegistry::new("liveness");
    let liveness = registry.register("worker", time::Duration::seconds(30));

    LikeWorker::new(
        "pipeline-test",
        queue.clone(),
        connector.clone(),
        Backoff::fixed(BACKOFF),
        liveness,
    )
}

/// Run the worker until `done` holds, failing the test if it takes longer than a few seconds.
async fn run_until<F>(worker: &LikeWorker<MemoryQueue, MemoryConnector>, done: F)
where
    F: Fn() -> bool,
{
    let wait = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    tokio::select! {
        _ = worker.run() => unreachable!("the worker loop never returns"),
        res = tokio::time::timeout(Duration::from_secs(5), wait) => {
            res.expect("pipeline did not drain in time")
        }
    }
}

#[tokio::test]
async fn counts_every_like_once() {
    let queue = MemoryQueue::new("like_queue");
    let store = MemoryCounterStore::new();
    let connector = MemoryConnector::new(store.clone());
    let worker = worker(&queue, &connector);

    for raw in ["post:1", "post:1", "post:2", "post:1"] {
        queue.push(&key(raw)).await.unwrap();
    }

    run_until(&worker, || {
        store.get("post:1") == Some(3) && store.get("post:2") == Some(1)
    })
    .await;

    assert!(queue.is_empty());
    assert_eq!(store.increments().len(), 4);
}

#[tokio::test]
async fn n_likes_for_one_key_count_n() {
    let queue = MemoryQueue::new("like_queue");
    let store = MemoryCounterStore::new();
    let connector = MemoryConnector::new(store.clone());
    let worker = worker(&queue, &connector);

    for _ in 0..250 {
        queue.push(&key("post:7")).await.unwrap();
    }

    run_until(&worker, || queue.is_empty() && store.get("post:7") == Some(250)).await;
}

#[tokio::test]
async fn rejected_like_is_not_redelivered() {
    let queue = MemoryQueue::new("like_queue");
    let store = MemoryCounterStore::new();
    store.reject("post:2");
    let connector = MemoryConnector::new(store.clone());
    let worker = worker(&queue, &connector);

    for raw in ["post:1", "post:2", "post:3"] {
        queue.push(&key(raw)).await.unwrap();
    }

    run_until(&worker, || store.get("post:3") == Some(1)).await;

    assert_eq!(store.get("post:1"), Some(1));
    assert_eq!(store.get("post:2"), None);
    assert_eq!(
        store.increments(),
        vec![key("post:1"), key("post:2"), key("post:3")]
    );
    assert!(queue.is_empty());
}

#[tokio::test]
async fn likes_pushed_during_a_store_outage_are_buffered() {
    let queue = MemoryQueue::new("like_queue");
    let store = MemoryCounterStore::new();
    let connector = MemoryConnector::new(store.clone()).unreachable_for(3);
    let worker = worker(&queue, &connector);

    let producer = queue.clone();
    let pushes = async move {
        for raw in ["post:1", "post:2", "post:1"] {
            producer.push(&key(raw)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };

    tokio::join!(
        pushes,
        run_until(&worker, || store.get("post:1") == Some(2) && store.get("post:2") == Some(1)),
    );

    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert!(pair[1] - pair[0] >= BACKOFF);
    }
}

#[tokio::test]
async fn likes_pushed_while_the_queue_is_down_never_arrive() {
    let queue = MemoryQueue::new("like_queue");
    let store = MemoryCounterStore::new();
    let connector = MemoryConnector::new(store.clone());
    let worker = worker(&queue, &connector);

    queue.set_available(false);
    assert!(queue.push(&key("post:1")).await.is_err());
    queue.set_available(true);

    queue.push(&key("post:2")).await.unwrap();

    run_until(&worker, || store.get("post:2") == Some(1)).await;

    assert_eq!(store.get("post:1"), None);
    assert_eq!(store.increments(), vec![key("post:2")]);
}
