//! Per-partition consumption state owned by the coordinator.

use std::fmt::Debug;
use std::sync::Arc;

use crate::topic::TopicResourceName;
use crate::worker::WorkerId;

/// A partition this worker tries to hold and consume.
///
/// `lock` and `unlock` only start the work: taking the remote partition lock,
/// fetching and committing happen inside the resource. Both must return
/// without blocking, since the coordinator calls them from its control loops.
pub trait PartitionResource: Debug + Send + Sync {
    fn partition(&self) -> i32;

    /// Start (or keep) trying to hold the remote partition lock. Idempotent.
    fn lock(&self);

    /// Stop serving, commit and release the remote lock.
    fn unlock(&self);

    /// The partition is being fetched and processed.
    fn is_serving(&self) -> bool;

    /// The remote lock is confirmed held.
    fn is_holding_lock(&self) -> bool;
}

/// Everything a factory needs to build the resource of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionContext {
    pub consumer_group: String,
    pub topic_name: String,
    pub topic_resource_name: TopicResourceName,
    pub partition: i32,
    pub worker_id: WorkerId,

    /// Offset supplied by the embedding application, if any.
    pub checkpoint: Option<i64>,
}

/// Creates partition resources the first time a partition is stolen.
pub trait PartitionResourceFactory: Debug + Send + Sync {
    fn create(&self, context: PartitionContext) -> Arc<dyn PartitionResource>;
}

/// Point-in-time view of one partition resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStatus {
    pub partition: i32,
    pub serving: bool,
    pub holding_lock: bool,
}

impl PartitionStatus {
    pub fn of(resource: &dyn PartitionResource) -> Self {
        Self {
            partition: resource.partition(),
            serving: resource.is_serving(),
            holding_lock: resource.is_holding_lock(),
        }
    }
}
