//! Diagnostic logging setup for daxgate binaries and embedders.
//!
//! Tracing output is operational and unsigned; the audit log is the
//! compliance record. Nothing logged here may contain schema text or
//! data values, only identifiers, counts, and latencies.

use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Initializes structured logging.
///
/// The verbosity flags pick a default level (0=INFO, 1=DEBUG, 2+=TRACE,
/// `quiet`=ERROR); a `RUST_LOG` directive in the environment takes
/// precedence over the flags.
///
/// # Errors
/// Returns a configuration error if a global subscriber is already set.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| {
            crate::error::DaxGateError::configuration(format!("failed to initialize logging: {e}"))
        })?;

    Ok(())
}

fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}
