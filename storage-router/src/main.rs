//! Router binary: parses configuration, performs the mandatory startup poll
//! of the master, then runs the HTTP front alongside the two control loops
//! until the process is killed.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use storage_router::config::RouterConfig;
use storage_router::control::{run_fid_poller, run_topology_poller, startup_poll};
use storage_router::discovery::Topology;
use storage_router::fid::FidCache;
use storage_router::http;
use storage_router::master::MasterClient;
use storage_router::metastore::InMemoryMetaStore;
use storage_router::pool::PoolSet;
use storage_router::router::Router;
use tracing::error;

#[tokio::main]
async fn main() {
    let config = RouterConfig::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_directive()))
        .init();

    if let Err(e) = run(config).await {
        error!(error = %e, "router exited with error");
        std::process::exit(1);
    }
}

async fn run(config: RouterConfig) -> anyhow::Result<()> {
    let master = Arc::new(MasterClient::new(config.master_url.clone()));
    let topology = Arc::new(Topology::new(
        PoolSet::new(),
        Default::default(),
        config.conn_pool_capacity,
    ));
    let fids = Arc::new(FidCache::new());

    // Mandatory synchronous poll: failure here is fatal, per spec.md §4.6.
    startup_poll(&master, &topology, &fids).await?;

    let router = Arc::new(Router::new(
        topology.clone(),
        fids.clone(),
        master.clone(),
        Arc::new(InMemoryMetaStore::new()),
        config.limit_num,
    ));

    tokio::spawn(run_topology_poller(master.clone(), topology.clone()));
    tokio::spawn(run_fid_poller(master.clone(), fids.clone()));

    let addr: SocketAddr = format!("{}:{}", config.listen_ip, config.listen_port).parse()?;
    http::serve(addr, router).await?;
    Ok(())
}
