//! The worker side of the partition ownership protocol.
//!
//! A [`WorkerCoordinator`] registers its worker with the coordination service,
//! runs one balancing pass and then keeps three fixed-delay loops going:
//!
//! - check partition: notices grown topics and deleted topics
//! - check worker info: refreshes the group membership and rebalances
//! - renew: extends the worker lease and every held partition lock in one call
//!
//! Workers never talk to each other, the service is the only source of truth.
//! Ownership is eventually consistent: a partition may briefly be held twice
//! or by nobody while workers converge.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::client::balance::{self, BalanceAction};
use crate::client::config::ConsumerConfig;
use crate::client::error::{Error, Result};
use crate::client::membership::Membership;
use crate::client::metrics::MetricsReporter;
use crate::client::partition::{
    PartitionContext, PartitionResource, PartitionResourceFactory, PartitionStatus,
};
use crate::client::service::CoordinationService;
use crate::protocol::messages::{
    ConsumeUnit, DescribeTopicRequest, DescribeTopicResponse, LockWorkerRequest,
    LockWorkerResponse, QueryWorkerRequest, RenewRequest, RenewResponse, WorkerInfoMap,
};
use crate::topic::{Topic, TopicResourceName};
use crate::worker::WorkerId;

/// Everything the builder resolved before the coordinator starts.
pub(crate) struct CoordinatorParts {
    pub(crate) consumer_group: String,
    pub(crate) topic_name: String,
    pub(crate) worker_id: WorkerId,
    pub(crate) expected_resource_name: Option<TopicResourceName>,
    pub(crate) config: ConsumerConfig,
    pub(crate) service: Arc<dyn CoordinationService>,
    pub(crate) factory: Arc<dyn PartitionResourceFactory>,
    pub(crate) checkpoints: HashMap<i32, i64>,
    pub(crate) metrics: Option<Arc<dyn MetricsReporter>>,
}

/// One worker of a consumer group, balancing partitions of one topic against
/// its peers.
///
/// Built by [`CoordinatorBuilder`](super::CoordinatorBuilder). Background
/// loops run until [`shutdown`](Self::shutdown) is called or the coordinator
/// is dropped; dropping stops the loops but leaves partitions to expire on
/// the service side.
#[derive(Debug)]
pub struct WorkerCoordinator {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    active: AtomicBool,
}

#[derive(Debug)]
struct Inner {
    consumer_group: String,
    topic: Topic,
    worker_id: WorkerId,
    config: ConsumerConfig,

    service: Arc<dyn CoordinationService>,
    factory: Arc<dyn PartitionResourceFactory>,
    checkpoints: HashMap<i32, i64>,
    metrics: Option<Arc<dyn MetricsReporter>>,

    membership: Membership,

    /// Partitions this worker actually works on, as opposed to what the
    /// service last reported.
    fetchers: Mutex<BTreeMap<i32, Arc<dyn PartitionResource>>>,

    /// Held for a whole balancing pass, passes never overlap.
    balance: Mutex<()>,

    /// Set once the topic incarnation is gone. No partition is taken after
    /// that, an empty fetcher map tells the embedding side to stop.
    topic_lost: AtomicBool,

    cancel: CancellationToken,
}

impl WorkerCoordinator {
    pub(crate) async fn start(parts: CoordinatorParts) -> Result<Self> {
        let CoordinatorParts {
            consumer_group,
            topic_name,
            worker_id,
            expected_resource_name,
            config,
            service,
            factory,
            checkpoints,
            metrics,
        } = parts;

        info!(worker_id = %worker_id, topic = %topic_name, "worker is initializing");

        let (topic, partition_count) =
            check_and_get_topic_info(service.as_ref(), topic_name, expected_resource_name).await?;

        let inner = Arc::new(Inner {
            consumer_group,
            topic,
            worker_id,
            config,
            service,
            factory,
            checkpoints,
            metrics,
            membership: Membership::new(partition_count),
            fetchers: Mutex::new(BTreeMap::new()),
            balance: Mutex::new(()),
            topic_lost: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        inner.register_self().await?;

        if let Err(err) = inner.refresh_worker_info().await {
            warn!(worker_id = %inner.worker_id, %err, "initial worker info query failed");
        }

        inner.make_balance();

        let mut tasks = vec![
            spawn_periodic(
                &inner,
                "check_partition",
                inner.config.check_partition_interval,
                |inner| async move {
                    inner.check_partition_tick().await;
                },
            ),
            spawn_periodic(
                &inner,
                "check_worker_info",
                inner.config.check_worker_info_interval,
                |inner| async move {
                    inner.check_worker_info_tick().await;
                },
            ),
            spawn_periodic(
                &inner,
                "renew",
                inner.config.renew_interval,
                |inner| async move { inner.renew_tick().await },
            ),
        ];

        if let (Some(interval), Some(_)) = (inner.config.report_metric_interval, &inner.metrics) {
            tasks.push(spawn_periodic(
                &inner,
                "report_metrics",
                interval,
                |inner| async move { inner.report_metrics_tick().await },
            ));
        }

        info!(
            worker_id = %inner.worker_id,
            topic = %inner.topic.resource_name,
            partitions = partition_count,
            "worker initialized",
        );

        Ok(Self {
            inner,
            tasks: Mutex::new(tasks),
            active: AtomicBool::new(true),
        })
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.inner.worker_id
    }

    pub fn consumer_group(&self) -> &str {
        &self.inner.consumer_group
    }

    pub fn topic(&self) -> &Topic {
        &self.inner.topic
    }

    pub fn topic_resource_name(&self) -> &TopicResourceName {
        &self.inner.topic.resource_name
    }

    /// Partition count as last observed by the check partition loop.
    pub fn partition_count(&self) -> i32 {
        self.inner.membership.partition_count()
    }

    /// Group membership as last reported by the coordination service.
    pub fn worker_info(&self) -> WorkerInfoMap {
        self.inner.membership.workers()
    }

    /// Local partitions whose remote lock is confirmed.
    pub fn held_partitions(&self) -> Vec<i32> {
        self.inner.renew_partition_list()
    }

    /// Local partitions that are being consumed.
    pub fn serving_partitions(&self) -> Vec<i32> {
        self.inner.serving_partitions()
    }

    pub fn partition_statuses(&self) -> Vec<PartitionStatus> {
        self.inner.partition_statuses()
    }

    /// The topic was deleted or recreated since the coordinator started.
    pub fn is_topic_lost(&self) -> bool {
        self.inner.topic_lost.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stops all loops, then unlocks every local partition.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            info!(worker_id = %self.inner.worker_id, "worker is already shut down");
            return;
        }

        info!(worker_id = %self.inner.worker_id, "worker is shutting down");

        // no tick or balancing pass may start once draining begins
        self.inner.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                warn!(worker_id = %self.inner.worker_id, %err, "periodic task ended abnormally");
            }
        }

        {
            let _pass = self.inner.balance.lock();
            self.inner.cancel_all_consuming_task();
        }

        info!(worker_id = %self.inner.worker_id, "worker shut down");
    }
}

impl Drop for WorkerCoordinator {
    fn drop(&mut self) {
        if self.active.load(Ordering::SeqCst) {
            warn!(
                worker_id = %self.inner.worker_id,
                "worker dropped without shutdown, partitions are left to expire",
            );
            self.inner.cancel.cancel();
        }
    }
}

async fn describe_topic(
    service: &dyn CoordinationService,
    topic_name: &str,
) -> Result<DescribeTopicResponse> {
    let request = DescribeTopicRequest {
        topic_name: topic_name.to_string(),
    };
    let response = service.describe_topic(&request).await?;

    if response.partition_count < 0 {
        return Err(Error::InvalidResponse(format!(
            "topic '{topic_name}' reports {} partitions",
            response.partition_count
        )));
    }

    Ok(response)
}

async fn check_and_get_topic_info(
    service: &dyn CoordinationService,
    topic_name: String,
    expected: Option<TopicResourceName>,
) -> Result<(Topic, i32)> {
    let response = describe_topic(service, &topic_name).await?;

    if let Some(expected) = expected {
        if expected != response.topic_resource_name {
            info!(topic = %topic_name, %expected, "consumer initialize failed by topic not found");
            return Err(Error::InvalidTopic {
                expected,
                actual: response.topic_resource_name,
            });
        }
    }

    Ok((
        Topic {
            name: topic_name,
            resource_name: response.topic_resource_name,
        },
        response.partition_count,
    ))
}

/// Runs `tick` every `interval` after the previous run finished, until the
/// coordinator is cancelled. Cancellation also interrupts a running tick.
fn spawn_periodic<F, Fut>(
    inner: &Arc<Inner>,
    name: &'static str,
    interval: Duration,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Inner>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let inner = Arc::clone(inner);
    let cancel = inner.cancel.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick(Arc::clone(&inner)) => {}
            }
        }

        debug!(worker_id = %inner.worker_id, task = name, "periodic task stopped");
    })
}

impl Inner {
    fn consume_unit(&self, partitions: Vec<i32>) -> ConsumeUnit {
        ConsumeUnit {
            consumer_group: self.consumer_group.clone(),
            topic_resource_name: self.topic.resource_name.clone(),
            partitions,
            worker_id: self.worker_id.clone(),
        }
    }

    fn partition_context(&self, partition: i32) -> PartitionContext {
        PartitionContext {
            consumer_group: self.consumer_group.clone(),
            topic_name: self.topic.name.clone(),
            topic_resource_name: self.topic.resource_name.clone(),
            partition,
            worker_id: self.worker_id.clone(),
            checkpoint: self.checkpoints.get(&partition).copied(),
        }
    }

    async fn register_self(&self) -> Result<()> {
        let request = LockWorkerRequest {
            consume_unit: self.consume_unit(vec![]),
        };
        let attempts = self.config.register_attempts();
        let mut backoff = Backoff::new(&self.config.retry_backoff);

        for attempt in 1..=attempts {
            match self.service.lock_worker(&request).await {
                Ok(LockWorkerResponse {
                    register_success: true,
                }) => {
                    info!(worker_id = %self.worker_id, "register self success");
                    return Ok(());
                }
                Ok(_) => {
                    warn!(worker_id = %self.worker_id, attempt, attempts, "register self rejected");
                }
                Err(err) => {
                    error!(worker_id = %self.worker_id, attempt, attempts, %err, "register self got error");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff.next()).await;
            }
        }

        error!(worker_id = %self.worker_id, "register self failed");
        Err(Error::RegisterFailed {
            worker_id: self.worker_id.clone(),
            attempts,
        })
    }

    /// Queries the group membership. Returns whether the report replaced the
    /// local view.
    async fn refresh_worker_info(&self) -> Result<bool> {
        let request = QueryWorkerRequest {
            consumer_group: self.consumer_group.clone(),
            topic_resource_name: self.topic.resource_name.clone(),
        };
        let response = self.service.query_worker(&request).await?;

        Ok(self
            .membership
            .replace_workers(&self.worker_id, response.worker_map))
    }

    fn trigger_rebalance(self: &Arc<Self>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.make_balance() })
    }

    /// One balancing pass against a consistent snapshot of the group.
    fn make_balance(&self) {
        let _pass = self.balance.lock();
        if self.cancel.is_cancelled() || self.topic_lost.load(Ordering::SeqCst) {
            return;
        }

        let snapshot = self.membership.snapshot();
        let held = self.serving_partitions();

        let action = balance::plan(
            &self.worker_id,
            snapshot.partition_count,
            &snapshot.workers,
            &held,
            &mut rand::thread_rng(),
        );

        match action {
            None => {
                // lease renewal is failing or the first query is still pending
                debug!(worker_id = %self.worker_id, "worker info does not contain this worker, skip balance");
            }
            Some(BalanceAction::Keep) => {
                debug!(worker_id = %self.worker_id, held = held.len(), "worker reached a balance state");
            }
            Some(BalanceAction::Steal(partitions)) => self.steal_partition_lock(&partitions),
            Some(BalanceAction::Release(partitions)) => self.release_partition_lock(&partitions),
        }
    }

    fn steal_partition_lock(&self, partitions: &[i32]) {
        info!(
            worker_id = %self.worker_id,
            count = partitions.len(),
            ?partitions,
            "try to steal partitions",
        );

        let resources = {
            let mut fetchers = self.fetchers.lock();
            partitions
                .iter()
                .map(|&partition| {
                    let resource = fetchers
                        .entry(partition)
                        .or_insert_with(|| self.factory.create(self.partition_context(partition)));
                    Arc::clone(resource)
                })
                .collect::<Vec<_>>()
        };

        for resource in resources {
            resource.lock();
        }
    }

    fn release_partition_lock(&self, partitions: &[i32]) {
        info!(
            worker_id = %self.worker_id,
            count = partitions.len(),
            ?partitions,
            "try to release partitions",
        );

        let resources = {
            let mut fetchers = self.fetchers.lock();
            partitions
                .iter()
                .filter_map(|partition| {
                    let resource = fetchers.remove(partition);
                    if resource.is_none() {
                        warn!(worker_id = %self.worker_id, partition, "partition is not held locally");
                    }
                    resource
                })
                .collect::<Vec<_>>()
        };

        for resource in resources {
            resource.unlock();
        }
    }

    /// Releases everything and keeps later passes from taking partitions of
    /// this topic incarnation.
    fn abandon_topic(&self) {
        // a pass in flight must not refill the map after it was drained
        let _pass = self.balance.lock();
        self.topic_lost.store(true, Ordering::SeqCst);
        self.cancel_all_consuming_task();
    }

    /// Releases everything after the worker lease was lost. Only a report
    /// listing this worker again re-enables balancing.
    fn abandon_membership(&self) {
        let _pass = self.balance.lock();
        self.membership.clear_workers();
        self.cancel_all_consuming_task();
    }

    /// Stops and unlocks every local partition.
    fn cancel_all_consuming_task(&self) {
        let fetchers = std::mem::take(&mut *self.fetchers.lock());
        if fetchers.is_empty() {
            return;
        }

        info!(
            worker_id = %self.worker_id,
            partitions = ?fetchers.keys().collect::<Vec<_>>(),
            "release all partitions",
        );

        for resource in fetchers.into_values() {
            resource.unlock();
        }
    }

    fn serving_partitions(&self) -> Vec<i32> {
        self.fetchers
            .lock()
            .iter()
            .filter(|(_, resource)| resource.is_serving())
            .map(|(partition, _)| *partition)
            .collect()
    }

    fn renew_partition_list(&self) -> Vec<i32> {
        self.fetchers
            .lock()
            .iter()
            .filter(|(_, resource)| resource.is_holding_lock())
            .map(|(partition, _)| *partition)
            .collect()
    }

    fn partition_statuses(&self) -> Vec<PartitionStatus> {
        self.fetchers
            .lock()
            .values()
            .map(|resource| PartitionStatus::of(resource.as_ref()))
            .collect()
    }

    /// Releases everything if the topic is gone, rebalances if it grew.
    /// Returns the triggered balancing pass.
    async fn check_partition_tick(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let response = match describe_topic(self.service.as_ref(), &self.topic.name).await {
            Ok(response) => response,
            Err(err) if err.is_topic_not_found() => {
                error!(
                    worker_id = %self.worker_id,
                    topic = %self.topic.name,
                    %err,
                    "topic does not exist, cancel all consuming tasks",
                );
                self.abandon_topic();
                return None;
            }
            Err(err) => {
                error!(worker_id = %self.worker_id, %err, "check partition failed");
                return None;
            }
        };

        if response.topic_resource_name != self.topic.resource_name {
            error!(
                worker_id = %self.worker_id,
                topic = %self.topic.resource_name,
                current = %response.topic_resource_name,
                "topic might have been deleted, cancel all consuming tasks",
            );
            self.abandon_topic();
            return None;
        }

        let previous = self
            .membership
            .grow_partition_count(response.partition_count)?;
        info!(
            worker_id = %self.worker_id,
            from = previous,
            to = response.partition_count,
            "partition count changed, execute a rebalance",
        );

        Some(self.trigger_rebalance())
    }

    /// Refreshes the membership and rebalances, whether or not it changed.
    async fn check_worker_info_tick(self: &Arc<Self>) -> JoinHandle<()> {
        if let Err(err) = self.refresh_worker_info().await {
            error!(worker_id = %self.worker_id, %err, "get worker info failed");
        }

        self.trigger_rebalance()
    }

    async fn renew_tick(&self) {
        let to_renew = self.renew_partition_list();
        let request = RenewRequest {
            consume_unit: self.consume_unit(to_renew.clone()),
        };
        let attempts = self.config.renew_attempts();
        let mut backoff = Backoff::new(&self.config.retry_backoff);

        let mut last_response: Option<RenewResponse> = None;
        for attempt in 1..=attempts {
            match self.service.renew(&request).await {
                Ok(response) => {
                    let complete = response.is_complete();
                    last_response = Some(response);
                    if complete {
                        debug!(
                            worker_id = %self.worker_id,
                            partitions = ?to_renew,
                            "heartbeat and partition renew success",
                        );
                        break;
                    }
                }
                Err(err) => {
                    error!(worker_id = %self.worker_id, attempt, attempts, %err, "renew error");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff.next()).await;
            }
        }

        let Some(response) = last_response else {
            error!(worker_id = %self.worker_id, "renew got no response, keep partitions until next tick");
            return;
        };

        if !response.heartbeat_success {
            error!(worker_id = %self.worker_id, "heartbeat failed, cancel all consuming tasks");
            self.abandon_membership();
        } else if !response.failed_partitions.is_empty() {
            error!(
                worker_id = %self.worker_id,
                partitions = ?response.failed_partitions,
                "failed to renew partitions",
            );
            self.release_partition_lock(&response.failed_partitions);
        }
    }

    async fn report_metrics_tick(&self) {
        let Some(reporter) = &self.metrics else {
            return;
        };

        let statuses = self.partition_statuses();
        if let Err(err) = reporter.report(&self.worker_id, statuses).await {
            error!(worker_id = %self.worker_id, %err, "push partition metrics failed");
        }
    }
}
