// Diagnostics go to stderr through a global tracing subscriber, so that stdout carries only the
// report and the tables.  RUST_LOG overrides the level chosen here.

use tracing_subscriber::filter::{self, EnvFilter};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::{prelude::*, registry};

pub fn init(verbose: bool) {
    let level = if verbose {
        filter::LevelFilter::DEBUG
    } else {
        filter::LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(env_filter);

    // A second init, as when tests drive the commands in-process, is harmless.
    let _ = registry().with(fmt_layer).try_init();
}
