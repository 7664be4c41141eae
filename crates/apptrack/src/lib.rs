//! Live registry of running applications with per-application behaviors.
//!
//! [`AppTracker`] wires the platform process source into the registry service.

mod factory;
mod tracker;

pub use factory::{PlatformProcessSource, PlatformProcessSourceFactory};
pub use tracker::AppTracker;

// Re-export core functionality
pub use apptrack_core::*;

use tracing_subscriber::EnvFilter;

/// Output format of [`init_tracing`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Install a global fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a subscriber is already installed.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = match format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
