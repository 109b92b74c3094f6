use tracing_subscriber::EnvFilter;

/// Initialise logging. The default level is `info`; `debug` is enabled through
/// `debug_logging` in config.json, in which case `RUST_LOG` may override it.
/// Logs go to stderr; stdout carries command-channel replies.
pub fn init(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
