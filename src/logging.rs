use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(verbose).compact();
    // A subscriber may already be installed, as in tests.
    _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}
