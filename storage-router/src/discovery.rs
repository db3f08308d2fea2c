//! Replica topology: the set of chunk-server groups the master currently
//! reports, kept alongside the connection pools that serve them.
//!
//! Grounded on `volo::discovery`: `diff_address` computes an address-only
//! added/removed set between two topology snapshots, the same way
//! `volo::discovery::diff_address` diffs `Instance` sets for a `Discover`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::net::Address;
use crate::pool::PoolSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicaStatus {
    Rw,
    Ro,
    Err,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GlobalStatus {
    Normal,
    Transferring,
}

/// A single chunk-server replica. Equality and hashing are address-only,
/// matching the diff algorithm: two replicas are "the same" instance if
/// they share a `(host, port)`, regardless of reported status drifting
/// between polls.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub group_id: u16,
    pub status: ReplicaStatus,
    pub global_status: GlobalStatus,
    pub max_free_space: u64,
    pub pending_writes: u32,
    pub writing_count: u32,
}

impl Replica {
    pub fn address(&self) -> Address {
        Address::new(self.host.clone(), self.port)
    }
}

impl PartialEq for Replica {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}
impl Eq for Replica {}
impl std::hash::Hash for Replica {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplicaGroup(pub Vec<Replica>);

/// The unit the topology swaps atomically: pools and groups must always be
/// read together, since a pool can only be trusted for a group that is
/// still current. Reading them through two independent locks was the
/// split-read hazard this type exists to close.
pub struct Snapshot {
    pub pools: PoolSet,
    pub groups: HashMap<u16, ReplicaGroup>,
}

pub struct Topology {
    snapshot: ArcSwap<Snapshot>,
    conn_pool_capacity: usize,
}

impl Topology {
    pub fn new(pools: PoolSet, groups: HashMap<u16, ReplicaGroup>, conn_pool_capacity: usize) -> Self {
        Self {
            snapshot: ArcSwap::new(Arc::new(Snapshot { pools, groups })),
            conn_pool_capacity,
        }
    }

    /// Seeds the topology from the first master poll at startup: every
    /// discovered replica gets a pool up front.
    pub fn bootstrap(&self, groups: HashMap<u16, ReplicaGroup>) {
        let pools = PoolSet::new();
        for group in groups.values() {
            for replica in &group.0 {
                pools.add_pool(&replica.address(), self.conn_pool_capacity);
            }
        }
        self.snapshot.store(Arc::new(Snapshot { pools, groups }));
    }

    /// The only read path for callers that need pools and groups together
    /// (selector, writer). Always consistent with each other.
    pub fn get_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Applies a freshly-polled topology: diffs against the current one and
    /// only rebuilds the pool set when membership actually changed.
    pub fn apply_new_topology(&self, new_groups: HashMap<u16, ReplicaGroup>) {
        let current = self.snapshot.load_full();
        let (added, removed) = diff_address(&current.groups, &new_groups);

        if added.is_empty() && removed.is_empty() {
            self.snapshot.store(Arc::new(Snapshot {
                pools: current.pools.clone(),
                groups: new_groups,
            }));
            return;
        }

        // Build the next pool set explicitly rather than cloning-then-pruning:
        // every surviving address is carried over via `add_exist_pool` (the
        // same `Pool`, not a fresh one), so an in-flight borrower never
        // notices the swap; only `added` addresses get a freshly dialed pool.
        let removed_addresses: HashSet<Address> = removed.iter().map(Replica::address).collect();
        let next_pools = PoolSet::new();
        for group in current.groups.values() {
            for replica in &group.0 {
                let address = replica.address();
                if removed_addresses.contains(&address) {
                    continue;
                }
                if let Some(pool) = current.pools.get(&address) {
                    next_pools.add_exist_pool(&address, pool);
                }
            }
        }
        for replica in &added {
            next_pools.add_pool(&replica.address(), self.conn_pool_capacity);
        }

        let draining_pools = current.pools.clone();
        self.snapshot.store(Arc::new(Snapshot {
            pools: next_pools,
            groups: new_groups,
        }));

        for replica in &removed {
            draining_pools.remove_and_close_pool(&replica.address());
        }
    }
}

fn all_replicas(groups: &HashMap<u16, ReplicaGroup>) -> HashSet<Replica> {
    groups.values().flat_map(|g| g.0.iter().cloned()).collect()
}

/// Address-only set diff between two topology snapshots.
pub fn diff_address(
    old: &HashMap<u16, ReplicaGroup>,
    new: &HashMap<u16, ReplicaGroup>,
) -> (Vec<Replica>, Vec<Replica>) {
    let old_set = all_replicas(old);
    let new_set = all_replicas(new);

    let added = new_set.difference(&old_set).cloned().collect();
    let removed = old_set.difference(&new_set).cloned().collect();
    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(host: &str, port: u16, status: ReplicaStatus) -> Replica {
        Replica {
            host: host.to_string(),
            port,
            group_id: 1,
            status,
            global_status: GlobalStatus::Normal,
            max_free_space: 1,
            pending_writes: 0,
            writing_count: 0,
        }
    }

    #[test]
    fn diff_address_finds_added_and_removed() {
        let mut old = HashMap::new();
        old.insert(
            1,
            ReplicaGroup(vec![replica("a", 1, ReplicaStatus::Rw), replica("b", 1, ReplicaStatus::Rw)]),
        );
        let mut new = HashMap::new();
        new.insert(
            1,
            ReplicaGroup(vec![replica("a", 1, ReplicaStatus::Rw), replica("c", 1, ReplicaStatus::Rw)]),
        );

        let (added, removed) = diff_address(&old, &new);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].host, "c");
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].host, "b");
    }

    #[test]
    fn diff_address_ignores_status_only_changes() {
        let mut old = HashMap::new();
        old.insert(1, ReplicaGroup(vec![replica("a", 1, ReplicaStatus::Rw)]));
        let mut new = HashMap::new();
        new.insert(1, ReplicaGroup(vec![replica("a", 1, ReplicaStatus::Ro)]));

        let (added, removed) = diff_address(&old, &new);
        assert!(added.is_empty());
        assert!(removed.is_empty());
    }

    #[test]
    fn bootstrap_creates_one_pool_per_replica() {
        let mut groups = HashMap::new();
        groups.insert(
            1,
            ReplicaGroup(vec![replica("a", 1, ReplicaStatus::Rw), replica("b", 1, ReplicaStatus::Rw)]),
        );
        let topology = Topology::new(PoolSet::new(), HashMap::new(), 8);
        topology.bootstrap(groups);

        let snapshot = topology.get_snapshot();
        assert!(snapshot.pools.get(&Address::new("a", 1)).is_some());
        assert!(snapshot.pools.get(&Address::new("b", 1)).is_some());
    }
}
