//! Control-plane pollers: two independent tickers that keep [`Topology`] and
//! [`FidCache`] fresh without the request path ever talking to the master
//! directly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::discovery::Topology;
use crate::error::RouterError;
use crate::fid::FidCache;
use crate::master::MasterClient;

/// Fixed per `spec.md` §4.6 — both pollers share this period.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls `/cm/v1/chunkmaster/route` on a fixed tick and applies the diff to
/// `topology`. Errors are logged; the router keeps serving the last good
/// snapshot.
pub async fn run_topology_poller(master: Arc<MasterClient>, topology: Arc<Topology>) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match master.fetch_topology().await {
            Ok(groups) => topology.apply_new_topology(groups),
            Err(e) => error!(error = %e, "topology poll failed, keeping last snapshot"),
        }
    }
}

/// Polls `/cm/v1/chunkmaster/fid` whenever the cache reports a shortage.
/// Errors are logged; `FidCache::get_fid_wait` callers retry their own
/// refill independently, so a failed background top-up is not fatal.
pub async fn run_fid_poller(master: Arc<MasterClient>, fids: Arc<FidCache>) {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !fids.is_shortage() {
            continue;
        }
        match master.fetch_fid_range().await {
            Ok((start, end)) => fids.merge(start, end, true),
            Err(e) => error!(error = %e, "fid poll failed, will retry next tick"),
        }
    }
}

/// Performs the one synchronous topology + fid poll startup requires before
/// the tickers take over. Failure of either is fatal, per `spec.md` §4.6.
pub async fn startup_poll(
    master: &MasterClient,
    topology: &Topology,
    fids: &FidCache,
) -> Result<(), RouterError> {
    info!("polling master for initial topology");
    let groups = master.fetch_topology().await?;
    topology.bootstrap(groups);

    info!("polling master for initial fid lease");
    let (start, end) = master.fetch_fid_range().await?;
    fids.merge(start, end, false);

    Ok(())
}
