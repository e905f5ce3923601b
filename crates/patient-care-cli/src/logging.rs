use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging to stderr.
///
/// `directive` is the configured filter; `verbose` raises it to `debug`.
/// Must be called once, before anything logs.
pub fn init_logging(directive: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    tracing::debug!(filter = directive, "Logging initialized");
}
