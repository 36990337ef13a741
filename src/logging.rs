//! Logging setup
//!
//! The library only emits `tracing` events (targets under `svdb::`).
//! Applications that do not install their own subscriber can call
//! [`init`] once at startup.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber.
///
/// Uses `RUST_LOG` if set, otherwise `warn` when `quiet`, `debug` when
/// `verbose`, and `info` by default. Does nothing if a subscriber is
/// already installed.
pub fn init(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Ignore error if a subscriber is already set (e.g. in tests).
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
