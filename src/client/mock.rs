//! In-memory coordination service and partition resources for tests.
//!
//! The service keeps one lock table per consumer group and topic incarnation.
//! Workers stay registered until [`MockCoordinationService::expire_worker`] is
//! called, partition locks until they are unlocked, revoked or their owner
//! expires. Faults are injected per API with
//! [`MockCoordinationService::fail_next`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::error::{Error, RequestContext, Result};
use crate::client::metrics::MetricsReporter;
use crate::client::partition::{
    PartitionContext, PartitionResource, PartitionResourceFactory, PartitionStatus,
};
use crate::client::service::CoordinationService;
use crate::protocol::api_key::ApiKey;
use crate::protocol::messages::{
    DescribeTopicRequest, DescribeTopicResponse, LockWorkerRequest, LockWorkerResponse,
    QueryWorkerRequest, QueryWorkerResponse, RenewRequest, RenewResponse, WorkerInfoMap,
};
use crate::topic::TopicResourceName;
use crate::worker::WorkerId;

#[derive(Debug, Clone)]
struct MockTopic {
    resource_name: TopicResourceName,
    partition_count: i32,
}

#[derive(Debug, Default)]
struct MockGroup {
    workers: BTreeSet<WorkerId>,
    owners: BTreeMap<i32, WorkerId>,
}

#[derive(Debug, Default)]
struct MockState {
    topics: HashMap<String, MockTopic>,
    incarnation: u64,
    groups: HashMap<(String, TopicResourceName), MockGroup>,
    rejected_registrations: usize,
    failing: HashMap<ApiKey, usize>,
    calls: HashMap<ApiKey, usize>,
    last_renewed: Option<Vec<i32>>,
}

impl MockState {
    /// Counts the call and consumes one injected failure, if any.
    fn enter(&mut self, api_key: ApiKey, request: RequestContext) -> Result<()> {
        *self.calls.entry(api_key).or_default() += 1;

        match self.failing.get_mut(&api_key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(Error::request(api_key, request, "injected failure"))
            }
            _ => Ok(()),
        }
    }

    fn group(&mut self, consumer_group: &str, topic: &TopicResourceName) -> &mut MockGroup {
        self.groups
            .entry((consumer_group.to_string(), topic.clone()))
            .or_default()
    }
}

/// Coordination service living entirely in memory.
#[derive(Debug, Default)]
pub struct MockCoordinationService {
    state: Mutex<MockState>,
}

impl MockCoordinationService {
    /// Creates a new incarnation of `name`, replacing an existing one.
    pub fn create_topic(&self, name: &str, partition_count: i32) -> TopicResourceName {
        let mut state = self.state.lock();
        state.incarnation += 1;

        let resource_name = TopicResourceName::new(format!("{}#{name}", state.incarnation));
        state.topics.insert(
            name.to_string(),
            MockTopic {
                resource_name: resource_name.clone(),
                partition_count,
            },
        );

        resource_name
    }

    pub fn delete_topic(&self, name: &str) {
        self.state.lock().topics.remove(name);
    }

    pub fn set_partition_count(&self, name: &str, partition_count: i32) {
        if let Some(topic) = self.state.lock().topics.get_mut(name) {
            topic.partition_count = partition_count;
        }
    }

    pub fn resource_name(&self, name: &str) -> Option<TopicResourceName> {
        self.state
            .lock()
            .topics
            .get(name)
            .map(|topic| topic.resource_name.clone())
    }

    /// Registers a worker without going through `lock_worker`.
    pub fn register_worker(
        &self,
        consumer_group: &str,
        topic: &TopicResourceName,
        worker_id: &WorkerId,
    ) {
        self.state
            .lock()
            .group(consumer_group, topic)
            .workers
            .insert(worker_id.clone());
    }

    /// Lets the lease of a worker lapse, dropping its partition locks too.
    pub fn expire_worker(
        &self,
        consumer_group: &str,
        topic: &TopicResourceName,
        worker_id: &WorkerId,
    ) {
        let mut state = self.state.lock();
        let group = state.group(consumer_group, topic);
        group.workers.remove(worker_id);
        group.owners.retain(|_, owner| owner != worker_id);
    }

    /// Drops the lock of one partition, whoever holds it.
    pub fn revoke_partition(&self, consumer_group: &str, topic: &TopicResourceName, partition: i32) {
        self.state
            .lock()
            .group(consumer_group, topic)
            .owners
            .remove(&partition);
    }

    /// Answers the next `count` registrations with `register_success = false`.
    pub fn reject_registrations(&self, count: usize) {
        self.state.lock().rejected_registrations = count;
    }

    /// Fails the next `count` calls of `api_key` with a transient error.
    pub fn fail_next(&self, api_key: ApiKey, count: usize) {
        self.state.lock().failing.insert(api_key, count);
    }

    /// Number of calls of `api_key` so far, failed ones included.
    pub fn calls(&self, api_key: ApiKey) -> usize {
        self.state
            .lock()
            .calls
            .get(&api_key)
            .copied()
            .unwrap_or_default()
    }

    /// Partitions of the most recent renew request.
    pub fn last_renewed(&self) -> Option<Vec<i32>> {
        self.state.lock().last_renewed.clone()
    }

    /// Partition lock owners of one group, ascending by partition.
    pub fn owners(&self, consumer_group: &str, topic: &TopicResourceName) -> BTreeMap<i32, WorkerId> {
        self.state.lock().group(consumer_group, topic).owners.clone()
    }

    pub fn owned_by(
        &self,
        consumer_group: &str,
        topic: &TopicResourceName,
        worker_id: &WorkerId,
    ) -> Vec<i32> {
        self.owners(consumer_group, topic)
            .into_iter()
            .filter(|(_, owner)| owner == worker_id)
            .map(|(partition, _)| partition)
            .collect()
    }

    /// Takes the lock of a partition unless another worker holds it.
    pub fn try_lock_partition(&self, context: &PartitionContext) -> bool {
        let mut state = self.state.lock();
        let group = state.group(&context.consumer_group, &context.topic_resource_name);

        match group.owners.get(&context.partition) {
            Some(owner) => owner == &context.worker_id,
            None => {
                group
                    .owners
                    .insert(context.partition, context.worker_id.clone());
                true
            }
        }
    }

    pub fn unlock_partition(&self, context: &PartitionContext) {
        let mut state = self.state.lock();
        let group = state.group(&context.consumer_group, &context.topic_resource_name);

        if group.owners.get(&context.partition) == Some(&context.worker_id) {
            group.owners.remove(&context.partition);
        }
    }
}

#[async_trait]
impl CoordinationService for MockCoordinationService {
    async fn describe_topic(
        &self,
        request: &DescribeTopicRequest,
    ) -> Result<DescribeTopicResponse> {
        let mut state = self.state.lock();
        state.enter(
            ApiKey::DescribeTopic,
            RequestContext::Topic(request.topic_name.clone()),
        )?;

        let topic = state
            .topics
            .get(&request.topic_name)
            .ok_or_else(|| Error::TopicNotFound {
                topic: request.topic_name.clone(),
            })?;

        Ok(DescribeTopicResponse {
            topic_resource_name: topic.resource_name.clone(),
            partition_count: topic.partition_count,
        })
    }

    async fn lock_worker(&self, request: &LockWorkerRequest) -> Result<LockWorkerResponse> {
        let unit = &request.consume_unit;
        let mut state = self.state.lock();
        state.enter(
            ApiKey::LockWorker,
            RequestContext::Worker(unit.worker_id.clone()),
        )?;

        if state.rejected_registrations > 0 {
            state.rejected_registrations -= 1;
            return Ok(LockWorkerResponse {
                register_success: false,
            });
        }

        state
            .group(&unit.consumer_group, &unit.topic_resource_name)
            .workers
            .insert(unit.worker_id.clone());

        Ok(LockWorkerResponse {
            register_success: true,
        })
    }

    async fn query_worker(&self, request: &QueryWorkerRequest) -> Result<QueryWorkerResponse> {
        let mut state = self.state.lock();
        state.enter(
            ApiKey::QueryWorker,
            RequestContext::Group {
                consumer_group: request.consumer_group.clone(),
                topic: request.topic_resource_name.clone(),
            },
        )?;

        let group = state.group(&request.consumer_group, &request.topic_resource_name);
        let mut worker_map = group
            .workers
            .iter()
            .map(|worker_id| (worker_id.clone(), vec![]))
            .collect::<WorkerInfoMap>();
        for (partition, owner) in &group.owners {
            if let Some(partitions) = worker_map.get_mut(owner) {
                partitions.push(*partition);
            }
        }

        Ok(QueryWorkerResponse { worker_map })
    }

    async fn renew(&self, request: &RenewRequest) -> Result<RenewResponse> {
        let unit = &request.consume_unit;
        let mut state = self.state.lock();
        state.enter(
            ApiKey::Renew,
            RequestContext::Group {
                consumer_group: unit.consumer_group.clone(),
                topic: unit.topic_resource_name.clone(),
            },
        )?;
        state.last_renewed = Some(unit.partitions.clone());

        let group = state.group(&unit.consumer_group, &unit.topic_resource_name);
        let failed_partitions = unit
            .partitions
            .iter()
            .filter(|&&partition| group.owners.get(&partition) != Some(&unit.worker_id))
            .copied()
            .collect();

        Ok(RenewResponse {
            heartbeat_success: group.workers.contains(&unit.worker_id),
            failed_partitions,
        })
    }
}

/// Partition resource that takes its lock in a [`MockCoordinationService`]
/// synchronously and serves as soon as the lock is held.
#[derive(Debug)]
pub struct MockPartitionResource {
    service: Arc<MockCoordinationService>,
    context: PartitionContext,
    serving: AtomicBool,
    holding_lock: AtomicBool,
    lock_calls: AtomicUsize,
    unlock_calls: AtomicUsize,
}

impl MockPartitionResource {
    pub fn context(&self) -> &PartitionContext {
        &self.context
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn unlock_calls(&self) -> usize {
        self.unlock_calls.load(Ordering::SeqCst)
    }

    pub fn set_serving(&self, serving: bool) {
        self.serving.store(serving, Ordering::SeqCst);
    }

    pub fn set_holding_lock(&self, holding_lock: bool) {
        self.holding_lock.store(holding_lock, Ordering::SeqCst);
    }
}

impl PartitionResource for MockPartitionResource {
    fn partition(&self) -> i32 {
        self.context.partition
    }

    fn lock(&self) {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);

        let locked = self.service.try_lock_partition(&self.context);
        self.holding_lock.store(locked, Ordering::SeqCst);
        self.serving.store(locked, Ordering::SeqCst);
    }

    fn unlock(&self) {
        self.unlock_calls.fetch_add(1, Ordering::SeqCst);

        self.serving.store(false, Ordering::SeqCst);
        self.holding_lock.store(false, Ordering::SeqCst);
        self.service.unlock_partition(&self.context);
    }

    fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    fn is_holding_lock(&self) -> bool {
        self.holding_lock.load(Ordering::SeqCst)
    }
}

/// Creates [`MockPartitionResource`]s and remembers every one it created.
#[derive(Debug)]
pub struct MockPartitionFactory {
    service: Arc<MockCoordinationService>,
    created: Mutex<Vec<Arc<MockPartitionResource>>>,
}

impl MockPartitionFactory {
    pub fn new(service: Arc<MockCoordinationService>) -> Self {
        Self {
            service,
            created: Mutex::new(vec![]),
        }
    }

    /// Every resource created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<MockPartitionResource>> {
        self.created.lock().clone()
    }

    /// The most recently created resource of `partition`.
    pub fn resource(&self, partition: i32) -> Option<Arc<MockPartitionResource>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|resource| resource.context.partition == partition)
            .cloned()
    }
}

impl PartitionResourceFactory for MockPartitionFactory {
    fn create(&self, context: PartitionContext) -> Arc<dyn PartitionResource> {
        let resource = Arc::new(MockPartitionResource {
            service: Arc::clone(&self.service),
            context,
            serving: AtomicBool::new(false),
            holding_lock: AtomicBool::new(false),
            lock_calls: AtomicUsize::new(0),
            unlock_calls: AtomicUsize::new(0),
        });
        self.created.lock().push(Arc::clone(&resource));

        resource
    }
}

/// Records every report it receives.
#[derive(Debug, Default)]
pub struct MockMetricsReporter {
    reports: Mutex<Vec<(WorkerId, Vec<PartitionStatus>)>>,
}

impl MockMetricsReporter {
    pub fn reports(&self) -> Vec<(WorkerId, Vec<PartitionStatus>)> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl MetricsReporter for MockMetricsReporter {
    async fn report(&self, worker_id: &WorkerId, partitions: Vec<PartitionStatus>) -> Result<()> {
        self.reports.lock().push((worker_id.clone(), partitions));
        Ok(())
    }
}
