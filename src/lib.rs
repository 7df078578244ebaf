pub mod batch_sizer;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod oracle;
pub mod orchestrator;
pub mod primes;
pub mod progress;
pub mod range;
pub mod search_state;
pub mod state;
pub mod worker;

pub use error::*;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber: fmt output filtered by `RUST_LOG`,
/// defaulting to `info`. Safe to call more than once.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
    if installed.is_ok() {
        tracing::debug!(service = service_name, "tracing initialized");
    }
}
