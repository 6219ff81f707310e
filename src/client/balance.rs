//! Partition balancing.
//!
//! Every worker runs the same computation on its own snapshot of the group:
//! the partitions are split into per-worker targets that differ by at most one,
//! the workers are ranked by how many partitions they hold, and the worker at
//! rank `i` aims for the `i`-th largest target. A worker below its target steals
//! random idle partitions, a worker above it releases the surplus.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::protocol::messages::WorkerInfoMap;
use crate::worker::WorkerId;

/// A worker and the number of partitions it holds, used to rank workers
/// within one balancing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPair {
    pub worker_id: WorkerId,
    pub held: usize,
}

impl Ord for WorkerPair {
    /// Most loaded first, ties broken by worker id so that every worker ranks
    /// the group identically.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .held
            .cmp(&self.held)
            .then_with(|| self.worker_id.cmp(&other.worker_id))
    }
}

impl PartialOrd for WorkerPair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of one balancing pass for one worker.
///
/// Stealing and releasing never happen in the same pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceAction {
    /// Balanced, or nothing to steal right now.
    Keep,

    /// Acquire these idle partitions.
    Steal(Vec<i32>),

    /// Give up these held partitions.
    Release(Vec<i32>),
}

/// Target partition counts per worker slot, largest first.
///
/// With fewer partitions than workers only `partition_count` slots of one
/// partition each are returned, the remaining workers stay idle.
pub fn compute_targets(partition_count: usize, worker_count: usize) -> Vec<usize> {
    if worker_count == 0 {
        return vec![];
    }

    if worker_count == 1 {
        return vec![partition_count];
    }

    if partition_count < worker_count {
        return vec![1; partition_count];
    }

    let base = partition_count / worker_count;
    let with_extra = partition_count % worker_count;

    let mut targets = Vec::with_capacity(worker_count);
    targets.extend(std::iter::repeat(base + 1).take(with_extra));
    targets.extend(std::iter::repeat(base).take(worker_count - with_extra));

    debug_assert_eq!(targets.iter().sum::<usize>(), partition_count);

    targets
}

/// Ranks workers by the number of partitions they hold, most loaded first.
pub fn sort_worker_pairs(workers: &WorkerInfoMap) -> Vec<WorkerPair> {
    let mut pairs = workers
        .iter()
        .map(|(worker_id, partitions)| WorkerPair {
            worker_id: worker_id.clone(),
            held: partitions.len(),
        })
        .collect::<Vec<_>>();

    pairs.sort();
    pairs
}

/// Partitions in `0..partition_count` that no worker claims, ascending.
pub fn idle_partitions(partition_count: i32, workers: &WorkerInfoMap) -> Vec<i32> {
    let claimed = workers.values().flatten().copied().collect::<BTreeSet<_>>();

    (0..partition_count)
        .filter(|partition| !claimed.contains(partition))
        .collect()
}

/// Decides between stealing and releasing for a worker holding `held` that
/// aims for `target` partitions.
///
/// Releases take the first surplus entries of `held`. Steals sample idle
/// partitions uniformly without replacement, and take all of them when there
/// are fewer than needed.
pub fn decide<R>(held: &[i32], target: usize, idle: &[i32], rng: &mut R) -> BalanceAction
where
    R: Rng + ?Sized,
{
    match held.len().cmp(&target) {
        Ordering::Equal => BalanceAction::Keep,
        Ordering::Greater => {
            let surplus = held.len() - target;
            BalanceAction::Release(held[..surplus].to_vec())
        }
        Ordering::Less => {
            let wanted = target - held.len();
            let mut candidates = idle.to_vec();
            let (chosen, _) = candidates.partial_shuffle(rng, wanted);

            if chosen.is_empty() {
                BalanceAction::Keep
            } else {
                BalanceAction::Steal(chosen.to_vec())
            }
        }
    }
}

/// Runs one balancing pass for `worker_id` against a consistent snapshot.
///
/// `held` lists the partitions this worker is currently serving. Returns
/// `None` when the worker is missing from the snapshot.
pub fn plan<R>(
    worker_id: &WorkerId,
    partition_count: i32,
    workers: &WorkerInfoMap,
    held: &[i32],
    rng: &mut R,
) -> Option<BalanceAction>
where
    R: Rng + ?Sized,
{
    if !workers.contains_key(worker_id) {
        return None;
    }

    let targets = compute_targets(
        usize::try_from(partition_count).unwrap_or_default(),
        workers.len(),
    );
    let pairs = sort_worker_pairs(workers);
    let position = pairs.iter().position(|pair| &pair.worker_id == worker_id)?;

    // more workers than partitions, this one got no slot
    let Some(&target) = targets.get(position) else {
        return Some(BalanceAction::Keep);
    };

    let idle = idle_partitions(partition_count, workers);
    Some(decide(held, target, &idle, rng))
}
