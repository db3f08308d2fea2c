//! Bounded, fail-fast connection pool, grounded on
//! `volo-thrift::transport::pool`: an idle list per key, an outstanding
//! count, checkout-or-dial on miss. Unlike the teacher's pool this one has
//! no idle-timeout reaper — chunk-server connections are long-lived and
//! nothing in this service calls for TTL eviction — and it fails fast at
//! capacity instead of growing unbounded.

use std::io;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::RouterError;
use crate::net::Address;

const OPCODE_PUT: u8 = 1;
const OPCODE_GET: u8 = 2;
const ACK_OK: u8 = 0;

/// A connection checked out from a [`Pool`]. Must be handed back with
/// [`Pool::release`]; a connection that errors should be [`PooledConn::close`]d
/// first so it is dropped instead of recycled.
pub struct PooledConn {
    address: Address,
    stream: Option<TcpStream>,
    closed: bool,
}

impl PooledConn {
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Writes one fragment. Framing is a minimal length-prefixed protocol;
    /// the wire format beyond "one write, one ack" is not specified upstream.
    pub async fn put(&mut self, file_id: u64, body: &[u8]) -> io::Result<()> {
        let stream = self
            .stream
            .as_mut()
            .expect("put called on a closed PooledConn");

        let mut frame = Vec::with_capacity(13 + body.len());
        frame.push(OPCODE_PUT);
        frame.extend_from_slice(&file_id.to_be_bytes());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(body);
        stream.write_all(&frame).await?;

        let mut ack = [0u8; 1];
        stream.read_exact(&mut ack).await?;
        if ack[0] != ACK_OK {
            return Err(io::Error::other("replica rejected write"));
        }
        Ok(())
    }

    /// Reads the `[start, end)` byte range of one fragment.
    pub async fn get(&mut self, file_id: u64, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let stream = self
            .stream
            .as_mut()
            .expect("get called on a closed PooledConn");

        let mut frame = Vec::with_capacity(25);
        frame.push(OPCODE_GET);
        frame.extend_from_slice(&file_id.to_be_bytes());
        frame.extend_from_slice(&start.to_be_bytes());
        frame.extend_from_slice(&end.to_be_bytes());
        stream.write_all(&frame).await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;
        Ok(body)
    }

    /// Marks the connection as unfit for reuse; `release` will drop it
    /// instead of returning it to the idle list.
    pub fn close(&mut self) {
        self.closed = true;
        self.stream = None;
    }
}

#[derive(Default)]
struct Inner {
    idle: Vec<TcpStream>,
    outstanding: usize,
}

/// Connection pool for a single replica address.
pub struct Pool {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            capacity: self.capacity,
        }
    }
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            capacity,
        }
    }

    /// Returns an idle connection if one exists, dials a new one if under
    /// capacity, or fails fast if the pool is already saturated.
    pub async fn get(&self, address: &Address) -> Result<PooledConn, RouterError> {
        let reused = {
            let mut inner = self.inner.lock();
            if let Some(stream) = inner.idle.pop() {
                inner.outstanding += 1;
                Some(stream)
            } else if inner.outstanding >= self.capacity {
                return Err(RouterError::ReplicaIo(format!(
                    "connection pool exhausted for {address}"
                )));
            } else {
                inner.outstanding += 1;
                None
            }
        };

        let stream = match reused {
            Some(stream) => stream,
            None => match TcpStream::connect(address.to_string()).await {
                Ok(stream) => stream,
                Err(e) => {
                    self.inner.lock().outstanding -= 1;
                    return Err(RouterError::ReplicaIo(e.to_string()));
                }
            },
        };

        Ok(PooledConn {
            address: address.clone(),
            stream: Some(stream),
            closed: false,
        })
    }

    /// Returns a connection to the pool, or drops it if it was closed.
    pub fn release(&self, mut conn: PooledConn) {
        let mut inner = self.inner.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        if !conn.closed {
            if let Some(stream) = conn.stream.take() {
                inner.idle.push(stream);
            }
        }
    }

    /// Called after an I/O error to discard any idle connections that may
    /// share the same dead link (e.g. after the peer resets the TCP stack).
    pub fn check_conn_pool(&self) {
        self.inner.lock().idle.clear();
    }

    fn close_idle(&self) {
        self.inner.lock().idle.clear();
    }
}

/// `DashMap<"host:port", Pool>`. [`PoolSet::add_exist_pool`] carries an
/// existing entry's `Pool` (a cheap `Arc` clone) into a new `PoolSet` by
/// reference rather than re-dialing it; this is how
/// [`crate::discovery::Topology`] builds each reconfigured snapshot's pool
/// set — every surviving address keeps the exact `Pool` in-flight borrowers
/// already hold a connection from — while addresses dropped from the
/// topology simply aren't carried over. Cloning the whole map is only used
/// for the no-op (membership-unchanged) case and for keeping a drain handle
/// on the outgoing set.
#[derive(Clone, Default)]
pub struct PoolSet(DashMap<String, Pool>);

impl PoolSet {
    pub fn new() -> Self {
        Self(DashMap::new())
    }

    pub fn add_pool(&self, address: &Address, capacity: usize) {
        self.0.entry(address.key()).or_insert_with(|| Pool::new(capacity));
    }

    pub fn add_exist_pool(&self, address: &Address, pool: Pool) {
        self.0.insert(address.key(), pool);
    }

    pub fn remove_pool(&self, address: &Address) -> Option<Pool> {
        self.0.remove(&address.key()).map(|(_, pool)| pool)
    }

    pub fn remove_and_close_pool(&self, address: &Address) {
        if let Some((_, pool)) = self.0.remove(&address.key()) {
            pool.close_idle();
        }
    }

    pub fn get(&self, address: &Address) -> Option<Pool> {
        self.0.get(&address.key()).map(|entry| entry.value().clone())
    }
}
