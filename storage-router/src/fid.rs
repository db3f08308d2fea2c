//! File-ID lease cache with coalesced refills.
//!
//! The coalescing primitive is a hand-rolled, explicit version of the
//! waiter-parking pattern `volo-thrift::transport::pool::Pool::get` already
//! uses internally: one `AtomicBool` decides who refills, everyone else
//! parks on a `tokio::sync::Notify` until the winner either succeeds or
//! fails.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::RouterError;

/// Below this many unused fids, a background poll eagerly requests more.
const LOW_WATER_MARK: u64 = 16;

#[derive(Debug, Clone, Copy, Default)]
struct FidLease {
    start: u64,
    end: u64,
    cursor: u64,
}

pub struct FidCache {
    lease: Mutex<FidLease>,
    refilling: AtomicBool,
    notify: Notify,
}

impl Default for FidCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FidCache {
    pub fn new() -> Self {
        Self {
            lease: Mutex::new(FidLease::default()),
            refilling: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Hands out the next fid from the current lease, or `None` if it is
    /// exhausted. Never blocks and never calls the master.
    pub fn get_fid(&self) -> Option<u64> {
        let mut lease = self.lease.lock();
        if lease.cursor >= lease.end {
            return None;
        }
        let fid = lease.cursor;
        lease.cursor += 1;
        Some(fid)
    }

    /// True once the remaining lease drops under [`LOW_WATER_MARK`].
    pub fn is_shortage(&self) -> bool {
        let lease = self.lease.lock();
        lease.end.saturating_sub(lease.cursor) < LOW_WATER_MARK
    }

    /// Extends the lease with a freshly polled `[start, end)` window. A
    /// window only younger than the current one is accepted; `cursor` is
    /// advanced to `start` if the previous lease had already run out, so a
    /// stale low tail is never handed out twice.
    pub fn merge(&self, new_start: u64, new_end: u64, wake: bool) {
        {
            let mut lease = self.lease.lock();
            if new_end > lease.end {
                if lease.cursor >= lease.end {
                    lease.cursor = lease.cursor.max(new_start);
                }
                lease.start = new_start;
                lease.end = new_end;
            }
        }
        if wake {
            self.notify.notify_waiters();
        }
    }

    /// Like [`FidCache::get_fid`], but if the lease is exhausted, coalesces
    /// concurrent callers behind a single `refill` call: the first caller to
    /// observe exhaustion runs `refill` and merges its result; everyone else
    /// parks until that resolves, then retries.
    pub async fn get_fid_wait<F, Fut>(&self, refill: F) -> Result<u64, RouterError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(u64, u64), RouterError>>,
    {
        loop {
            if let Some(fid) = self.get_fid() {
                return Ok(fid);
            }

            if self
                .refilling
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let outcome = refill().await;
                let result = match outcome {
                    Ok((start, end)) => {
                        self.merge(start, end, true);
                        Ok(())
                    }
                    Err(e) => {
                        self.notify.notify_waiters();
                        Err(e)
                    }
                };
                self.refilling.store(false, Ordering::Release);
                result?;
                continue;
            }

            let notified = self.notify.notified();
            if self.refilling.load(Ordering::Acquire) {
                notified.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn get_fid_respects_lease_bounds() {
        let cache = FidCache::new();
        cache.merge(0, 2, false);
        assert_eq!(cache.get_fid(), Some(0));
        assert_eq!(cache.get_fid(), Some(1));
        assert_eq!(cache.get_fid(), None);
    }

    #[test]
    fn is_shortage_tracks_remaining_budget() {
        let cache = FidCache::new();
        cache.merge(0, 4, false);
        assert!(cache.is_shortage());
        cache.merge(4, 4 + LOW_WATER_MARK, false);
        assert!(!cache.is_shortage());
    }

    #[tokio::test]
    async fn get_fid_wait_refills_once_under_concurrency() {
        let cache = Arc::new(FidCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_fid_wait(|| {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, RouterError>((0, 8))
                        }
                    })
                    .await
            }));
        }

        let mut fids = Vec::new();
        for handle in handles {
            fids.push(handle.await.unwrap().unwrap());
        }
        fids.sort_unstable();
        assert_eq!(fids, (0..8).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
