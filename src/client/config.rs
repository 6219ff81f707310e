use std::net::IpAddr;
use std::time::Duration;

use crate::backoff::BackoffConfig;

/// DEFAULT_CHECK_PARTITION_INTERVAL is how often the partition count of the
/// topic is compared against the cached one.
pub const DEFAULT_CHECK_PARTITION_INTERVAL: Duration = Duration::from_secs(60);

/// DEFAULT_CHECK_WORKER_INFO_INTERVAL is how often the group membership is
/// refreshed, each refresh is followed by a balancing pass.
pub const DEFAULT_CHECK_WORKER_INFO_INTERVAL: Duration = Duration::from_secs(10);

/// DEFAULT_RENEW_INTERVAL must stay well below the lease TTL of the service.
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(7);

pub const DEFAULT_RENEW_MAX_RETRY: usize = 1;

pub const DEFAULT_REGISTER_MAX_RETRY: usize = 1;

/// Tuning knobs of a [`WorkerCoordinator`](super::coordinator::WorkerCoordinator).
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub check_partition_interval: Duration,
    pub check_worker_info_interval: Duration,
    pub renew_interval: Duration,

    /// Extra renew attempts after the first one within a single tick.
    pub renew_max_retry: usize,

    /// Extra registration attempts after the first one. Exhausting them aborts
    /// construction.
    pub register_max_retry: usize,

    /// Enables the partition status report loop when set.
    pub report_metric_interval: Option<Duration>,

    /// Address embedded into generated worker ids, detected when `None`.
    pub client_ip: Option<IpAddr>,

    /// Delay between attempts of a retried request.
    pub retry_backoff: BackoffConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            check_partition_interval: DEFAULT_CHECK_PARTITION_INTERVAL,
            check_worker_info_interval: DEFAULT_CHECK_WORKER_INFO_INTERVAL,
            renew_interval: DEFAULT_RENEW_INTERVAL,
            renew_max_retry: DEFAULT_RENEW_MAX_RETRY,
            register_max_retry: DEFAULT_REGISTER_MAX_RETRY,
            report_metric_interval: None,
            client_ip: None,
            retry_backoff: BackoffConfig::default(),
        }
    }
}

impl ConsumerConfig {
    pub(crate) fn renew_attempts(&self) -> usize {
        self.renew_max_retry + 1
    }

    pub(crate) fn register_attempts(&self) -> usize {
        self.register_max_retry + 1
    }
}
