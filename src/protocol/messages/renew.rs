use super::ConsumeUnit;

/// Renews the worker lease and the lock of every partition listed in the
/// consume unit in one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewRequest {
    pub consume_unit: ConsumeUnit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewResponse {
    /// Whether the worker lease itself was renewed.
    pub heartbeat_success: bool,

    /// Partitions whose lock could not be renewed.
    pub failed_partitions: Vec<i32>,
}

impl RenewResponse {
    /// Worker lease and every partition lock were renewed.
    pub fn is_complete(&self) -> bool {
        self.heartbeat_success && self.failed_partitions.is_empty()
    }
}
