use std::sync::Arc;

use futures::future::join_all;
use spark_broker_config::{Broker, BrokerKey, CachedTargets, Queue, TargetsConfig};
use spark_broker_ingress::memory::InMemoryQueue;
use spark_broker_ingress::{DecoupleRouter, Event, IngressSettings, SendContext, SendOutcome};

const BROKERS: usize = 16;
const SENDS_PER_BROKER: usize = 8;

fn topic(index: usize) -> String {
    format!("topic-{index}")
}

fn broker_key(index: usize) -> BrokerKey {
    BrokerKey::new("default", format!("broker-{index}"))
}

fn fixture() -> (Arc<DecoupleRouter>, InMemoryQueue) {
    let config = (0..BROKERS).fold(TargetsConfig::new(), |config, index| {
        config.with_broker(
            Broker::new(&broker_key(index)).with_decouple_queue(Queue::ready(topic(index))),
        )
    });
    let targets = Arc::new(CachedTargets::with_snapshot(config));
    let queue = InMemoryQueue::new();
    let router = DecoupleRouter::new(targets, Arc::new(queue.clone()), IngressSettings::default());
    (Arc::new(router), queue)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_brokers_resolve_independent_handles_concurrently() {
    let (router, queue) = fixture();

    let tasks = (0..BROKERS).flat_map(|index| {
        let router = Arc::clone(&router);
        (0..SENDS_PER_BROKER).map(move |attempt| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let event = Event::new(format!("e-{index}-{attempt}"), "//load", "load.test");
                router
                    .send(&SendContext::new(), &broker_key(index), &event)
                    .await
            })
        })
    });
    let results = join_all(tasks.collect::<Vec<_>>()).await;

    for result in results {
        let outcome = result.expect("任务不应 panic").expect("发布应成功");
        assert!(matches!(outcome, SendOutcome::Published(_)));
    }
    for index in 0..BROKERS {
        assert_eq!(queue.opened(&topic(index)), 1, "竞争调用只能创建一个句柄");
        assert_eq!(
            queue.published(&topic(index)).len(),
            SENDS_PER_BROKER,
            "Broker 之间不应互相串扰"
        );
        assert_eq!(queue.closed(&topic(index)), 0);
    }
    assert_eq!(router.registry().len(), BROKERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_sends_for_one_broker_create_a_single_handle() {
    let (router, queue) = fixture();
    let key = broker_key(0);

    let tasks = (0..64).map(|attempt| {
        let router = Arc::clone(&router);
        let key = key.clone();
        tokio::spawn(async move {
            let event = Event::new(format!("e-{attempt}"), "//load", "load.test");
            router.send(&SendContext::new(), &key, &event).await
        })
    });
    for result in join_all(tasks).await {
        result.expect("任务不应 panic").expect("发布应成功");
    }

    assert_eq!(queue.opened(&topic(0)), 1);
    assert_eq!(queue.published(&topic(0)).len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_sends_after_drift_close_stale_handle_once() {
    let targets = Arc::new(CachedTargets::with_snapshot(TargetsConfig::new().with_broker(
        Broker::new(&broker_key(0)).with_decouple_queue(Queue::ready("t1")),
    )));
    let queue = InMemoryQueue::new();
    let router = Arc::new(DecoupleRouter::new(
        targets.clone(),
        Arc::new(queue.clone()),
        IngressSettings::default(),
    ));
    let key = broker_key(0);
    router
        .send(&SendContext::new(), &key, &Event::new("e-warm", "//load", "load.test"))
        .await
        .expect("首次发布应成功");

    targets.store(TargetsConfig::new().with_broker(
        Broker::new(&key).with_decouple_queue(Queue::ready("t2")),
    ));
    let tasks = (0..64).map(|attempt| {
        let router = Arc::clone(&router);
        let key = key.clone();
        tokio::spawn(async move {
            let event = Event::new(format!("e-{attempt}"), "//load", "load.test");
            router.send(&SendContext::new(), &key, &event).await
        })
    });
    for result in join_all(tasks).await {
        let outcome = result.expect("任务不应 panic").expect("发布应成功");
        assert!(matches!(outcome, SendOutcome::Published(ref receipt) if receipt.topic == "t2"));
    }

    assert_eq!(queue.closed("t1"), 1, "竞争调用只能关闭一次旧句柄");
    assert_eq!(queue.opened("t2"), 1, "竞争调用只能创建一个新句柄");
    assert_eq!(queue.published("t2").len(), 64);
}
