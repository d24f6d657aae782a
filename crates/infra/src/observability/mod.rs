//! Observability infrastructure for logging and client metrics
//!
//! [`init_tracing`] installs the process-wide `tracing` subscriber. Services
//! in this crate only emit events; they never install a subscriber
//! themselves.

pub mod metrics;

use rentline_domain::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

pub use metrics::{ClientMetrics, MetricsSnapshot};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config.level` is used as the filter.
/// Returns `false` when a global subscriber was already installed, which
/// makes repeated calls harmless.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        Registry::default().with(filter).with(fmt::layer().json()).try_init()
    } else {
        Registry::default().with(filter).with(fmt::layer()).try_init()
    };

    installed.is_ok()
}
