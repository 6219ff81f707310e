mod test_helpers;

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use rstalos::client::config::ConsumerConfig;
use rstalos::client::coordinator::WorkerCoordinator;
use rstalos::client::error::Error;
use rstalos::client::mock::{MockCoordinationService, MockMetricsReporter, MockPartitionFactory};
use rstalos::client::CoordinatorBuilder;
use rstalos::protocol::api_key::ApiKey;
use rstalos::topic::TopicResourceName;
use rstalos::worker::WorkerId;

use crate::test_helpers::maybe_start_logging;

const GROUP: &str = "billing";
const TOPIC: &str = "orders";

struct Cluster {
    service: Arc<MockCoordinationService>,
    factory: Arc<MockPartitionFactory>,
    resource_name: TopicResourceName,
}

impl Cluster {
    fn new(partitions: i32) -> Self {
        let service = Arc::new(MockCoordinationService::default());
        let resource_name = service.create_topic(TOPIC, partitions);
        let factory = Arc::new(MockPartitionFactory::new(Arc::clone(&service)));

        Self {
            service,
            factory,
            resource_name,
        }
    }

    fn builder(&self) -> CoordinatorBuilder {
        CoordinatorBuilder::new(
            GROUP,
            TOPIC,
            Arc::clone(&self.service) as _,
            Arc::clone(&self.factory) as _,
        )
    }

    async fn worker(&self, worker_id: &str) -> WorkerCoordinator {
        self.builder().worker_id(worker_id).build().await.unwrap()
    }

    fn owned_by(&self, worker_id: &str) -> Vec<i32> {
        self.service
            .owned_by(GROUP, &self.resource_name, &WorkerId::from(worker_id))
    }
}

#[tokio::test(start_paused = true)]
async fn workers_converge_to_a_fair_disjoint_split() {
    maybe_start_logging();

    let cluster = Cluster::new(10);
    let workers = [
        cluster.worker("worker-a").await,
        cluster.worker("worker-b").await,
        cluster.worker("worker-c").await,
    ];

    // the first worker grabbed everything before the others joined
    assert_eq!(workers[0].held_partitions().len(), 10);

    tokio::time::sleep(Duration::from_secs(120)).await;

    let owners = cluster.service.owners(GROUP, &cluster.resource_name);
    assert_eq!(owners.len(), 10);

    let mut counts = Vec::new();
    let mut seen = BTreeSet::new();
    for worker in &workers {
        let held = worker.held_partitions();
        assert_eq!(held, cluster.owned_by(worker.worker_id().as_str()));
        for partition in &held {
            assert!(seen.insert(*partition), "partition {partition} held twice");
        }
        counts.push(held.len());
    }
    counts.sort_unstable();
    assert_eq!(counts, vec![3, 3, 4]);

    for worker in &workers {
        worker.shutdown().await;
    }
    assert!(cluster
        .service
        .owners(GROUP, &cluster.resource_name)
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_lease_releases_every_partition() {
    maybe_start_logging();

    let cluster = Cluster::new(4);
    let worker = cluster.worker("worker-a").await;
    assert_eq!(worker.held_partitions(), vec![0, 1, 2, 3]);

    cluster
        .service
        .expire_worker(GROUP, &cluster.resource_name, worker.worker_id());
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(worker.held_partitions().is_empty());
    assert!(worker.serving_partitions().is_empty());
    for resource in cluster.factory.created() {
        assert_eq!(resource.unlock_calls(), 1);
    }

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deleted_topic_keeps_the_partition_check_alive() {
    maybe_start_logging();

    let cluster = Cluster::new(2);
    let worker = cluster.worker("worker-a").await;

    cluster.service.delete_topic(TOPIC);
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert!(worker.partition_statuses().is_empty());
    let describes = cluster.service.calls(ApiKey::DescribeTopic);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(cluster.service.calls(ApiKey::DescribeTopic) > describes);

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn grown_topic_is_picked_up() {
    maybe_start_logging();

    let cluster = Cluster::new(2);
    let worker = cluster.worker("worker-a").await;

    cluster.service.set_partition_count(TOPIC, 5);
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(worker.partition_count(), 5);
    assert_eq!(worker.held_partitions(), vec![0, 1, 2, 3, 4]);

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_loop() {
    maybe_start_logging();

    let cluster = Cluster::new(3);
    let worker = cluster.worker("worker-a").await;
    tokio::time::sleep(Duration::from_secs(15)).await;

    worker.shutdown().await;
    assert!(!worker.is_active());

    let calls = [ApiKey::DescribeTopic, ApiKey::QueryWorker, ApiKey::Renew]
        .map(|api_key| cluster.service.calls(api_key));

    tokio::time::sleep(Duration::from_secs(300)).await;

    let after = [ApiKey::DescribeTopic, ApiKey::QueryWorker, ApiKey::Renew]
        .map(|api_key| cluster.service.calls(api_key));
    assert_eq!(calls, after);
    assert!(cluster
        .service
        .owners(GROUP, &cluster.resource_name)
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn metrics_are_reported_on_schedule() {
    maybe_start_logging();

    let cluster = Cluster::new(2);
    let reporter = Arc::new(MockMetricsReporter::default());
    let worker = cluster
        .builder()
        .worker_id("worker-a")
        .config(ConsumerConfig {
            report_metric_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        })
        .metrics_reporter(Arc::clone(&reporter) as _)
        .build()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(65)).await;
    worker.shutdown().await;

    let reports = reporter.reports();
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|(_, statuses)| statuses.len() == 2 && statuses.iter().all(|s| s.serving)));
}

#[tokio::test(start_paused = true)]
async fn generated_worker_id_embeds_prefix_and_address() {
    let cluster = Cluster::new(1);
    let worker = cluster
        .builder()
        .worker_id_prefix("billing-")
        .config(ConsumerConfig {
            client_ip: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            ..Default::default()
        })
        .build()
        .await
        .unwrap();

    assert!(worker.worker_id().as_str().starts_with("billing-10.0.0.1-"));
    assert_eq!(worker.consumer_group(), GROUP);
    assert_eq!(worker.topic().name, TOPIC);
    assert_eq!(worker.topic_resource_name(), &cluster.resource_name);

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_registration_aborts_construction() {
    let cluster = Cluster::new(1);
    cluster.service.fail_next(ApiKey::LockWorker, 2);

    let err = cluster.builder().worker_id("worker-a").build().await.unwrap_err();

    assert_matches!(err, Error::RegisterFailed { ref worker_id, attempts: 2 } if worker_id.as_str() == "worker-a");
    assert!(cluster.factory.created().is_empty());
}
