//! Fan-out write and best-effort download against one replica group.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::warn;

use crate::discovery::{ReplicaGroup, ReplicaStatus};
use crate::error::RouterError;
use crate::net::Address;
use crate::pool::{Pool, PoolSet};

/// Writes `body` as `file_id` to every `RW` replica in `group`, in
/// parallel, and only succeeds if every one of them acknowledges.
pub async fn write_fragment(
    pools: &PoolSet,
    group: &ReplicaGroup,
    file_id: u64,
    body: Arc<Vec<u8>>,
) -> Result<(), RouterError> {
    let targets: Vec<_> = group
        .0
        .iter()
        .filter(|r| matches!(r.status, ReplicaStatus::Rw))
        .map(|r| r.address())
        .collect();
    if targets.is_empty() {
        return Err(RouterError::NoReplica);
    }

    let (tx, mut rx) = mpsc::channel(targets.len());
    for address in targets.iter().cloned() {
        let tx = tx.clone();
        let pools = pools.clone();
        let body = body.clone();
        tokio::spawn(async move {
            let report = write_one(&pools, &address, file_id, &body).await;
            let _ = tx.send(report).await;
        });
    }
    drop(tx);

    let mut last_err = None;
    for _ in 0..targets.len() {
        if let Some(Err(e)) = rx.recv().await {
            last_err = Some(e);
        }
    }

    match last_err {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

async fn write_one(
    pools: &PoolSet,
    address: &Address,
    file_id: u64,
    body: &[u8],
) -> Result<(), RouterError> {
    let pool = pools
        .get(address)
        .ok_or_else(|| RouterError::ReplicaIo(format!("no pool for {address}")))?;
    write_with_pool(&pool, address, file_id, body).await
}

async fn write_with_pool(
    pool: &Pool,
    address: &Address,
    file_id: u64,
    body: &[u8],
) -> Result<(), RouterError> {
    let mut conn = pool.get(address).await?;
    match conn.put(file_id, body).await {
        Ok(()) => {
            pool.release(conn);
            Ok(())
        }
        Err(e) => {
            conn.close();
            pool.release(conn);
            pool.check_conn_pool();
            Err(RouterError::ReplicaIo(e.to_string()))
        }
    }
}

/// Reads the `[start, end)` range of `file_id` from a random `RW` replica
/// in `group`, falling back to the next `RW` replica in the group if that
/// one is unreachable or errors.
pub async fn download_fragment(
    pools: &PoolSet,
    group: &ReplicaGroup,
    file_id: u64,
    start: u64,
    end: u64,
) -> Result<Vec<u8>, RouterError> {
    let candidates: Vec<_> = group
        .0
        .iter()
        .filter(|r| matches!(r.status, ReplicaStatus::Rw))
        .map(|r| r.address())
        .collect();
    if candidates.is_empty() {
        return Err(RouterError::NoReplica);
    }

    let first = rand::rng().random_range(0..candidates.len());
    for offset in 0..candidates.len() {
        let address = &candidates[(first + offset) % candidates.len()];
        let Some(pool) = pools.get(address) else {
            continue;
        };
        let mut conn = match pool.get(address).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(%address, error = %e, "download checkout failed, trying next replica");
                continue;
            }
        };
        match conn.get(file_id, start, end).await {
            Ok(bytes) => {
                pool.release(conn);
                return Ok(bytes);
            }
            Err(e) => {
                conn.close();
                pool.release(conn);
                pool.check_conn_pool();
                warn!(%address, error = %e, "download read failed, trying next replica");
            }
        }
    }

    Err(RouterError::ReplicaIo(
        "no RW replica in the group served the download".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{GlobalStatus, Replica};

    fn replica(host: &str, status: ReplicaStatus) -> Replica {
        Replica {
            host: host.to_string(),
            port: 1,
            group_id: 0,
            status,
            global_status: GlobalStatus::Normal,
            max_free_space: 100,
            pending_writes: 0,
            writing_count: 0,
        }
    }

    #[tokio::test]
    async fn write_fragment_fails_fast_with_no_rw_replicas() {
        let group = ReplicaGroup(vec![replica("a", ReplicaStatus::Offline)]);
        let pools = PoolSet::new();
        let result = write_fragment(&pools, &group, 1, Arc::new(vec![1, 2, 3])).await;
        assert!(matches!(result, Err(RouterError::NoReplica)));
    }

    #[tokio::test]
    async fn download_fragment_fails_with_no_rw_replicas() {
        let group = ReplicaGroup(vec![replica("a", ReplicaStatus::Err)]);
        let pools = PoolSet::new();
        let result = download_fragment(&pools, &group, 1, 0, 10).await;
        assert!(matches!(result, Err(RouterError::NoReplica)));
    }
}
