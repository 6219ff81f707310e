use std::collections::BTreeMap;

use crate::topic::TopicResourceName;
use crate::worker::WorkerId;

/// Alive workers and the partitions the service believes each one holds.
pub type WorkerInfoMap = BTreeMap<WorkerId, Vec<i32>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWorkerRequest {
    /// The consumer group name.
    pub consumer_group: String,

    /// The topic incarnation.
    pub topic_resource_name: TopicResourceName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryWorkerResponse {
    /// Every alive worker, including workers that hold no partition.
    pub worker_map: WorkerInfoMap,
}
