//! Individual coordination messages.

mod describe_topic;
pub use describe_topic::*;
mod lock_worker;
pub use lock_worker::*;
mod query_worker;
pub use query_worker::*;
mod renew;
pub use renew::*;

use crate::topic::TopicResourceName;
use crate::worker::WorkerId;

/// The unit a worker acts on: one consumer group reading one topic incarnation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeUnit {
    /// The consumer group name.
    pub consumer_group: String,

    /// The topic incarnation.
    pub topic_resource_name: TopicResourceName,

    /// Partition indices the request refers to. Empty for worker registration.
    pub partitions: Vec<i32>,

    /// The worker issuing the request.
    pub worker_id: WorkerId,
}
