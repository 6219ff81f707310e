use std::collections::btree_map::Entry;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::protocol::messages::WorkerInfoMap;
use crate::worker::WorkerId;

/// The partition count of the topic and the group membership, as last
/// reported by the coordination service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub partition_count: i32,
    pub workers: WorkerInfoMap,
}

/// Shared view of the group, read by the balancing pass and refreshed by the
/// watch loops. Both values sit behind one lock so a snapshot is consistent.
#[derive(Debug, Default)]
pub struct Membership {
    state: RwLock<MembershipSnapshot>,
}

impl Membership {
    pub fn new(partition_count: i32) -> Self {
        Self {
            state: RwLock::new(MembershipSnapshot {
                partition_count,
                workers: WorkerInfoMap::new(),
            }),
        }
    }

    pub fn partition_count(&self) -> i32 {
        self.state.read().partition_count
    }

    /// Stores `partition_count` if it is larger than the cached count and
    /// returns the previous count in that case.
    ///
    /// Shrinking topics are not supported, a smaller count is ignored.
    pub fn grow_partition_count(&self, partition_count: i32) -> Option<i32> {
        let mut state = self.state.write();
        if state.partition_count < partition_count {
            Some(std::mem::replace(&mut state.partition_count, partition_count))
        } else {
            None
        }
    }

    pub fn workers(&self) -> WorkerInfoMap {
        self.state.read().workers.clone()
    }

    /// Deep copy of partition count and membership taken under one read lock.
    pub fn snapshot(&self) -> MembershipSnapshot {
        self.state.read().clone()
    }

    /// Forgets every worker, balancing stays off until a report listing this
    /// worker is accepted again.
    pub fn clear_workers(&self) {
        self.state.write().workers.clear();
    }

    /// Replaces the membership wholesale with a fresh service report.
    ///
    /// A report that is empty or lacks `worker_id` comes from a failed read or
    /// a lost lease and is rejected, leaving the current view untouched.
    /// Returns whether the report was accepted.
    pub fn replace_workers(&self, worker_id: &WorkerId, workers: WorkerInfoMap) -> bool {
        if workers.is_empty() || !workers.contains_key(worker_id) {
            debug!(
                worker_id = %worker_id,
                reported = workers.len(),
                "ignoring worker report without this worker",
            );
            return false;
        }

        let mut state = self.state.write();
        for (id, partitions) in &workers {
            match state.workers.entry(id.clone()) {
                Entry::Occupied(o) => {
                    if o.get().len() != partitions.len() {
                        debug!(
                            worker = %id,
                            current = o.get().len(),
                            new = partitions.len(),
                            "Worker load update",
                        );
                    }
                }
                Entry::Vacant(_) => {
                    info!(
                        worker = %id,
                        partitions = partitions.len(),
                        "New worker",
                    );
                }
            }
        }
        for id in state.workers.keys() {
            if !workers.contains_key(id) {
                info!(worker = %id, "Worker left");
            }
        }

        state.workers = workers;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers(entries: &[(&str, &[i32])]) -> WorkerInfoMap {
        entries
            .iter()
            .map(|(id, partitions)| (WorkerId::from(*id), partitions.to_vec()))
            .collect()
    }

    #[test]
    fn partition_count_only_grows() {
        let membership = Membership::new(4);

        assert_eq!(membership.grow_partition_count(4), None);
        assert_eq!(membership.grow_partition_count(2), None);
        assert_eq!(membership.partition_count(), 4);

        assert_eq!(membership.grow_partition_count(6), Some(4));
        assert_eq!(membership.partition_count(), 6);
    }

    #[test]
    fn report_replaces_membership_wholesale() {
        let me = WorkerId::from("w1");
        let membership = Membership::new(4);

        assert!(membership.replace_workers(&me, workers(&[("w1", &[0]), ("w2", &[1, 2])])));
        assert!(membership.replace_workers(&me, workers(&[("w1", &[0, 3])])));

        assert_eq!(membership.workers(), workers(&[("w1", &[0, 3])]));
    }

    #[test]
    fn report_without_self_is_rejected() {
        let me = WorkerId::from("w1");
        let membership = Membership::new(4);
        let before = workers(&[("w1", &[0, 1]), ("w2", &[2, 3])]);
        assert!(membership.replace_workers(&me, before.clone()));

        assert!(!membership.replace_workers(&me, workers(&[("w2", &[0, 1, 2, 3])])));
        assert!(!membership.replace_workers(&me, WorkerInfoMap::new()));

        assert_eq!(membership.workers(), before);
    }

    #[test]
    fn cleared_membership_waits_for_a_report_with_self() {
        let me = WorkerId::from("w1");
        let membership = Membership::new(2);
        membership.replace_workers(&me, workers(&[("w1", &[0, 1])]));

        membership.clear_workers();
        assert!(membership.workers().is_empty());
        assert_eq!(membership.partition_count(), 2);

        assert!(!membership.replace_workers(&me, workers(&[("w2", &[0])])));
        assert!(membership.workers().is_empty());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let me = WorkerId::from("w1");
        let membership = Membership::new(2);
        membership.replace_workers(&me, workers(&[("w1", &[0])]));

        let snapshot = membership.snapshot();
        membership.replace_workers(&me, workers(&[("w1", &[0, 1])]));
        membership.grow_partition_count(3);

        assert_eq!(snapshot.partition_count, 2);
        assert_eq!(snapshot.workers, workers(&[("w1", &[0])]));
    }
}
