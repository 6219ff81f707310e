use std::collections::HashMap;
use std::sync::Arc;

use crate::client::coordinator::CoordinatorParts;
use crate::client::metrics::MetricsReporter;
use crate::client::partition::PartitionResourceFactory;
use crate::client::service::CoordinationService;
use crate::topic::TopicResourceName;
use crate::worker::{local_ip, WorkerId};

pub mod balance;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod membership;
pub mod metrics;
#[cfg(any(test, feature = "test-utilities"))]
pub mod mock;
pub mod partition;
pub mod service;

use self::config::ConsumerConfig;
use self::coordinator::WorkerCoordinator;
use error::Result;

/// Builder for [`WorkerCoordinator`].
pub struct CoordinatorBuilder {
    consumer_group: String,
    topic_name: String,
    service: Arc<dyn CoordinationService>,
    factory: Arc<dyn PartitionResourceFactory>,
    config: ConsumerConfig,
    worker_id: Option<WorkerId>,
    worker_id_prefix: String,
    expected_resource_name: Option<TopicResourceName>,
    checkpoints: HashMap<i32, i64>,
    metrics: Option<Arc<dyn MetricsReporter>>,
}

impl CoordinatorBuilder {
    /// Create a new [`CoordinatorBuilder`] for one consumer group reading one
    /// topic.
    pub fn new(
        consumer_group: impl Into<String>,
        topic_name: impl Into<String>,
        service: Arc<dyn CoordinationService>,
        factory: Arc<dyn PartitionResourceFactory>,
    ) -> Self {
        Self {
            consumer_group: consumer_group.into(),
            topic_name: topic_name.into(),
            service,
            factory,
            config: ConsumerConfig::default(),
            worker_id: None,
            worker_id_prefix: String::new(),
            expected_resource_name: None,
            checkpoints: HashMap::new(),
            metrics: None,
        }
    }

    pub fn config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a fixed worker id instead of generating one.
    ///
    /// The id must be unique within the consumer group.
    pub fn worker_id(mut self, worker_id: impl Into<WorkerId>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// Prefix of the generated worker id, ignored when a worker id is set.
    pub fn worker_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_id_prefix = prefix.into();
        self
    }

    /// Refuse to start unless the topic currently resolves to `resource_name`.
    pub fn topic_resource_name(mut self, resource_name: impl Into<TopicResourceName>) -> Self {
        self.expected_resource_name = Some(resource_name.into());
        self
    }

    /// Starting offsets handed to the partition factory, keyed by partition.
    pub fn checkpoints(mut self, checkpoints: HashMap<i32, i64>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    /// Receives the partition status report, see
    /// [`ConsumerConfig::report_metric_interval`].
    pub fn metrics_reporter(mut self, reporter: Arc<dyn MetricsReporter>) -> Self {
        self.metrics = Some(reporter);
        self
    }

    /// Build [`WorkerCoordinator`].
    ///
    /// Resolves the topic, registers the worker and runs the first balancing
    /// pass before returning.
    pub async fn build(self) -> Result<WorkerCoordinator> {
        let worker_id = match self.worker_id {
            Some(worker_id) => worker_id,
            None => WorkerId::generate(
                &self.worker_id_prefix,
                self.config.client_ip.unwrap_or_else(local_ip),
            ),
        };

        WorkerCoordinator::start(CoordinatorParts {
            consumer_group: self.consumer_group,
            topic_name: self.topic_name,
            worker_id,
            expected_resource_name: self.expected_resource_name,
            config: self.config,
            service: self.service,
            factory: self.factory,
            checkpoints: self.checkpoints,
            metrics: self.metrics,
        })
        .await
    }
}

impl std::fmt::Debug for CoordinatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorBuilder")
            .field("consumer_group", &self.consumer_group)
            .field("topic_name", &self.topic_name)
            .finish_non_exhaustive()
    }
}
