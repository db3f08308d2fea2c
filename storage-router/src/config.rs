//! Command-line configuration, in the style of `volo-cli`'s
//! `RootCommand` (`clap::Parser`, kebab-case flags, repeatable `-v`).

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "router",
    author,
    version,
    about = "Gateway between client applications and a replicated chunk-server fleet.",
    rename_all = "kebab-case"
)]
pub struct RouterConfig {
    /// Base URL of the chunk master, e.g. `http://127.0.0.1:8099`.
    #[clap(long)]
    pub master_url: String,

    /// Address the HTTP front listens on.
    #[clap(long, default_value = "0.0.0.0")]
    pub listen_ip: String,

    /// Port the HTTP front listens on.
    #[clap(long, default_value_t = 8089)]
    pub listen_port: u16,

    /// Minimum number of healthy RW replicas a group must have to be
    /// selectable for a write.
    #[clap(long, default_value_t = 1)]
    pub limit_num: usize,

    /// Per-replica connection pool capacity.
    #[clap(long, default_value_t = 16)]
    pub conn_pool_capacity: usize,

    /// Metadata store connection string. The reference `InMemoryMetaStore`
    /// ignores this; a production deployment's `MetaStore` adapter would
    /// parse it.
    #[clap(long, default_value = "")]
    pub metastore_dsn: String,

    /// Turn on verbose logging. Repeat for more detail (`-v`, `-vv`, `-vvv`).
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl RouterConfig {
    /// Maps `-v` occurrences to a `tracing_subscriber::EnvFilter` directive,
    /// the same ladder `volo-cli` uses for `log::LevelFilter`, but expressed
    /// for `tracing` since the rest of the router logs through it directly.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
