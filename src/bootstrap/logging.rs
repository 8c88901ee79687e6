//! Setup for the application logging.
//!
//! It redirects the log info to the standard output with the log threshold
//! defined in the configuration:
//!
//! - `Off`
//! - `Error`
//! - `Warn`
//! - `Info`
//! - `Debug`
//! - `Trace`
//!
//! When `RUST_LOG` is set it is used instead, so that the threshold can be
//! changed per crate.
use std::sync::Once;

use peer_banner_configuration::{Logging, Threshold};
use tracing::info;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// It redirects the log info to the standard output with the log threshold
/// defined in the configuration.
pub fn setup(cfg: &Logging) {
    let threshold = cfg.threshold;

    if threshold == Threshold::Off {
        return;
    }

    INIT.call_once(|| {
        tracing_stdout_init(filter(threshold));
    });
}

fn filter(threshold: Threshold) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(threshold.to_string()))
}

fn tracing_stdout_init(filter: EnvFilter) {
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    info!("Logging initialized");
}
