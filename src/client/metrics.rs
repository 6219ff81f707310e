use std::fmt::Debug;

use async_trait::async_trait;

use crate::client::error::Result;
use crate::client::partition::PartitionStatus;
use crate::worker::WorkerId;

/// Sink for the periodic partition status report of one worker.
///
/// Enabled by setting
/// [`ConsumerConfig::report_metric_interval`](super::config::ConsumerConfig::report_metric_interval)
/// and passing a reporter to the builder. Errors are logged and the next report
/// is attempted on schedule.
#[async_trait]
pub trait MetricsReporter: Debug + Send + Sync {
    async fn report(&self, worker_id: &WorkerId, partitions: Vec<PartitionStatus>) -> Result<()>;
}
