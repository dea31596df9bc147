//! Command-line entry point. Most configuration lives in the
//! environment (§4.12); the handful of flags here are the ones an
//! operator commonly wants to override at the command line without
//! exporting an env var first.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "job-coordinator", about = "GPU key-recovery job coordination server")]
pub struct Cli {
    /// Overrides HOST_ADDR.
    #[arg(long, env = "HOST_ADDR")]
    pub host: Option<String>,

    /// Overrides HOST_PORT.
    #[arg(long, env = "HOST_PORT")]
    pub port: Option<u16>,

    /// Tracing filter, e.g. `info` or `coordinator_engine=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}
