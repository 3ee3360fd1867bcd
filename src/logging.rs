//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{Result, SombraError};

/// Installs a formatting subscriber filtered by `directives`
/// (`RUST_LOG` syntax, e.g. `"sombra_ptt=debug"`).
pub fn init_logging(directives: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(directives)
                .map_err(|_| SombraError::Invalid("invalid log filter"))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| SombraError::Invalid("logging already initialized"))
}

/// Like [`init_logging`], preferring `RUST_LOG` when it is set.
pub fn init_logging_from_env(fallback: &str) -> Result<()> {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => init_logging(&directives),
        _ => init_logging(fallback),
    }
}
