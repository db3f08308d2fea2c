//! Router-level end-to-end scenarios from `spec.md` §8: the single-replica
//! happy-path round trip, and a topology swap that drains a removed
//! replica's pool without disturbing requests already in flight against it.

use std::collections::HashMap;
use std::sync::Arc;

use storage_router::discovery::{GlobalStatus, Replica, ReplicaGroup, ReplicaStatus, Topology};
use storage_router::fid::FidCache;
use storage_router::master::MasterClient;
use storage_router::metastore::{FragmentKey, InMemoryMetaStore, RegistryVersion};
use storage_router::net::Address;
use storage_router::pool::PoolSet;
use storage_router::router::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const OPCODE_PUT: u8 = 1;
const OPCODE_GET: u8 = 2;
const ACK_OK: u8 = 0;

/// Fake chunk server: serves one PUT followed by any number of GETs,
/// echoing back whatever body it was last written.
async fn spawn_fake_replica() -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut last_body = Vec::new();

        loop {
            let mut opcode = [0u8; 1];
            if stream.read_exact(&mut opcode).await.is_err() {
                return;
            }
            match opcode[0] {
                OPCODE_PUT => {
                    let mut file_id = [0u8; 8];
                    stream.read_exact(&mut file_id).await.unwrap();
                    let mut len_buf = [0u8; 4];
                    stream.read_exact(&mut len_buf).await.unwrap();
                    let len = u32::from_be_bytes(len_buf) as usize;
                    let mut body = vec![0u8; len];
                    stream.read_exact(&mut body).await.unwrap();
                    last_body = body;
                    stream.write_all(&[ACK_OK]).await.unwrap();
                }
                OPCODE_GET => {
                    let mut rest = [0u8; 24];
                    stream.read_exact(&mut rest).await.unwrap();
                    let len = (last_body.len() as u32).to_be_bytes();
                    stream.write_all(&len).await.unwrap();
                    stream.write_all(&last_body).await.unwrap();
                }
                _ => panic!("unexpected opcode {}", opcode[0]),
            }
        }
    });

    Address::new(addr.ip().to_string(), addr.port())
}

fn replica(address: &Address, group_id: u16) -> Replica {
    Replica {
        host: address.host.clone(),
        port: address.port,
        group_id,
        status: ReplicaStatus::Rw,
        global_status: GlobalStatus::Normal,
        max_free_space: 1 << 30,
        pending_writes: 0,
        writing_count: 0,
    }
}

#[tokio::test]
async fn single_replica_write_then_download_round_trips() {
    let addr = spawn_fake_replica().await;

    let mut groups = HashMap::new();
    groups.insert(1u16, ReplicaGroup(vec![replica(&addr, 1)]));
    let topology = Arc::new(Topology::new(PoolSet::new(), HashMap::new(), 4));
    topology.bootstrap(groups);

    let fids = Arc::new(FidCache::new());
    fids.merge(0, 8, false);

    let router = Router::new(
        topology,
        fids,
        Arc::new(MasterClient::new("http://127.0.0.1:0")),
        Arc::new(InMemoryMetaStore::new()),
        1,
    );

    let key = FragmentKey {
        path: "/a".into(),
        index: 0,
        start: 0,
        end: 5,
    };
    let location = router
        .upload(key, true, RegistryVersion::V2, b"hello".to_vec())
        .await
        .expect("single healthy RW replica should accept the write");
    assert_eq!(location.group_id, 1);
    assert_eq!(location.file_id, 0);

    let downloaded = router.download("/a", 0).await.unwrap();
    assert_eq!(downloaded, b"hello");
}

#[tokio::test]
async fn topology_swap_drains_removed_pool_without_breaking_in_flight_borrow() {
    let kept = spawn_fake_replica().await;
    let removed = spawn_fake_replica().await;

    let mut groups = HashMap::new();
    groups.insert(1u16, ReplicaGroup(vec![replica(&kept, 1), replica(&removed, 1)]));
    let topology = Arc::new(Topology::new(PoolSet::new(), HashMap::new(), 4));
    topology.bootstrap(groups);

    // Borrow a connection to `removed` before the swap and hold onto it
    // across the topology change, the way an in-flight write would.
    let snapshot_before = topology.get_snapshot();
    let pool_before = snapshot_before.pools.get(&removed).unwrap();
    let mut borrowed = pool_before.get(&removed).await.unwrap();

    let mut next_groups = HashMap::new();
    next_groups.insert(1u16, ReplicaGroup(vec![replica(&kept, 1)]));
    topology.apply_new_topology(next_groups);

    // New snapshot no longer has a pool for the removed replica.
    let snapshot_after = topology.get_snapshot();
    assert!(snapshot_after.pools.get(&removed).is_none());
    assert!(snapshot_after.pools.get(&kept).is_some());

    // The connection borrowed before the swap still works; the old pool's
    // idle entries were drained, but this borrower's own checked-out
    // connection was never touched.
    borrowed.put(99, b"still alive").await.unwrap();
    pool_before.release(borrowed);
}
