//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, SheafError};

/// Installs a global fmt subscriber filtered by `filter` (`EnvFilter` syntax,
/// e.g. `"sheaf=debug"` or `"warn,sheaf::join=trace"`).
///
/// Fails on an invalid filter or when a global subscriber is already set.
pub fn init_logging(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| SheafError::config(format!("invalid log filter `{filter}`: {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| SheafError::config("Logging already initialized"))
}
