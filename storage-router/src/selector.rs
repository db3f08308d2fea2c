//! Replica-group selection: filter eligible groups, keep a bounded top-k by
//! score, then weighted-random pick among the finalists.
//!
//! Grounded on `volo::loadbalance::least_conn` (scored candidate table) and
//! `volo::loadbalance::random` (weighted pick among candidates) for style;
//! the bounded top-k heap itself has no direct analogue in the teacher and
//! follows the `filter -> score -> pick` shape of `LoadBalance::get_picker`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use rand::Rng;

use crate::discovery::{GlobalStatus, ReplicaGroup, ReplicaStatus};
use crate::error::RouterError;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    group_id: u16,
    min_max_free_space: u64,
    pending_writes: u32,
    writing_count: u32,
}

impl Candidate {
    /// Higher is better: more free space, then fewer pending writes, then
    /// fewer in-flight writes, with group id as a final tiebreaker.
    fn rank_key(&self) -> (u64, Reverse<u32>, Reverse<u32>, Reverse<u16>) {
        (
            self.min_max_free_space,
            Reverse(self.pending_writes),
            Reverse(self.writing_count),
            Reverse(self.group_id),
        )
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.rank_key() == other.rank_key()
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    // Reversed on purpose: `BinaryHeap::pop` removes the greatest element,
    // and keeping only the top-k best means evicting the *worst* candidate
    // on overflow. Treating the worst-ranked candidate as "greatest" under
    // this `Ord` makes plain `heap.pop()` do that eviction.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.rank_key().cmp(&self.rank_key())
    }
}

/// Picks a replica group for a write of `size` bytes.
///
/// A group is eligible when every replica reports `globalStatus == NORMAL`,
/// every replica's status is `RW` or `ERR` (any `RO`/`OFFLINE` replica
/// disqualifies the whole group), at least `limit_num` replicas are `RW`,
/// and the smallest `maxFreeSpace` among non-`ERR` replicas exceeds `size`.
/// Among eligible groups, the best `k = groups/10 + 3` by score are kept and
/// one is picked uniformly at random.
pub fn select_group(
    groups: &HashMap<u16, ReplicaGroup>,
    size: u64,
    limit_num: usize,
) -> Result<u16, RouterError> {
    let mut candidates = Vec::new();

    for (&group_id, group) in groups {
        if group.0.is_empty() {
            continue;
        }
        if group
            .0
            .iter()
            .any(|r| !matches!(r.global_status, GlobalStatus::Normal))
        {
            continue;
        }
        if group
            .0
            .iter()
            .any(|r| !matches!(r.status, ReplicaStatus::Rw | ReplicaStatus::Err))
        {
            continue;
        }

        let non_err_free_space = group
            .0
            .iter()
            .filter(|r| !matches!(r.status, ReplicaStatus::Err))
            .map(|r| r.max_free_space)
            .min();
        let Some(min_max_free_space) = non_err_free_space else {
            continue;
        };
        if min_max_free_space <= size {
            continue;
        }

        let normal_num = group
            .0
            .iter()
            .filter(|r| matches!(r.status, ReplicaStatus::Rw))
            .count();
        if normal_num < limit_num {
            continue;
        }

        let pending_writes = group.0.iter().map(|r| r.pending_writes).max().unwrap_or(0);
        let writing_count = group.0.iter().map(|r| r.writing_count).max().unwrap_or(0);

        candidates.push(Candidate {
            group_id,
            min_max_free_space,
            pending_writes,
            writing_count,
        });
    }

    if candidates.is_empty() {
        return Err(RouterError::NoReplica);
    }

    let k = candidates.len() / 10 + 3;
    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
    for candidate in candidates {
        heap.push(candidate);
        if heap.len() > k {
            heap.pop();
        }
    }

    let finalists = heap.into_vec();
    let idx = rand::rng().random_range(0..finalists.len());
    Ok(finalists[idx].group_id)
}
