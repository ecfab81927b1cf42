// Logging setup for binaries and tests embedding the agent
use tracing_subscriber::EnvFilter;

use crate::{ParlanceError, Result};

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_directives`. Setting
/// `PARLANCE_LOG_FORMAT=json` emits JSON lines instead of the human format.
pub fn init_logging(default_directives: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let json = std::env::var("PARLANCE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let installed = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };

    installed.map_err(|e| ParlanceError::Config(format!("logging already initialised: {e}")))
}

/// Test helper: installs a test-writer subscriber once, ignoring repeats.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
