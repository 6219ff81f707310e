//! Client side contract of the central coordination service.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::client::error::Result;
use crate::protocol::messages::{
    DescribeTopicRequest, DescribeTopicResponse, LockWorkerRequest, LockWorkerResponse,
    QueryWorkerRequest, QueryWorkerResponse, RenewRequest, RenewResponse,
};

/// The remote service holding worker and partition locks per consumer group.
///
/// Every call may block on network I/O. Implementations report a deleted
/// topic as [`Error::TopicNotFound`](crate::client::error::Error::TopicNotFound)
/// and every other failure as a transient
/// [`Error::Request`](crate::client::error::Error::Request); retries are
/// driven by the caller.
#[async_trait]
pub trait CoordinationService: Debug + Send + Sync {
    async fn describe_topic(&self, request: &DescribeTopicRequest)
        -> Result<DescribeTopicResponse>;

    async fn lock_worker(&self, request: &LockWorkerRequest) -> Result<LockWorkerResponse>;

    async fn query_worker(&self, request: &QueryWorkerRequest) -> Result<QueryWorkerResponse>;

    async fn renew(&self, request: &RenewRequest) -> Result<RenewResponse>;
}
