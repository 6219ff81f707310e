use super::ConsumeUnit;

/// Registers a worker with its consumer group.
///
/// Idempotent: locking an already registered worker succeeds again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockWorkerRequest {
    pub consume_unit: ConsumeUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockWorkerResponse {
    pub register_success: bool,
}
