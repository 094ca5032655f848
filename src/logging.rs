//! Logging initialization via `tracing-subscriber`.
//!
//! Diagnostics go to stderr so stdout stays machine-readable in `--json`
//! mode. The event log under `.inshallah/` is the audit channel and is
//! unaffected by verbosity.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the flags;
/// otherwise `-v` maps to `debug`, `--quiet` to `error`, default `warn`.
pub fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("inshallah={default_level}")));

    // Ignore failure: tests and embedders may have installed a subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(true, false);
        init_logging(false, true);
    }
}
