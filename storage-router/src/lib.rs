//! `storage_router`: the library half of the Router gateway. `main.rs` is a
//! thin binary that parses [`config::RouterConfig`], wires these modules
//! together, and runs the HTTP front and control loops to completion.

pub mod config;
pub mod control;
pub mod discovery;
pub mod error;
pub mod fid;
pub mod http;
pub mod master;
pub mod metastore;
pub mod net;
pub mod pool;
pub mod router;
pub mod selector;
pub mod writer;
