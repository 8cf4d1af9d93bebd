//! Tracing setup for the `br` binary.
//!
//! Verbosity is controlled by `-v`/`-vv` and `--quiet`; `RUST_LOG` always
//! wins when set, since that's what agents scripting around `br` expect.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Map `-v` count and `--quiet` to a default filter directive.
///
/// `RUST_LOG`, if set, overrides this entirely.
fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// When `log_path` is given, logs are appended there in JSON form instead
/// of going to stderr -- this is how the daemon supervisor keeps its own
/// log file separate from the foreground CLI's human-readable output.
pub fn init_logging(verbose: u8, quiet: bool, log_path: Option<&Path>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let result = match log_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(move || file.try_clone().expect("clone daemon log handle"))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_writer(io::stderr)
            .try_init(),
    };

    // Safe to call more than once per process (e.g. tests spawning the CLI
    // in-process); a second attempt just means the subscriber is already set.
    result.ok();
    Ok(())
}
