use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoUtc;

/// Install the global subscriber.
///
/// `LOG_LEVEL` wins over `RUST_LOG`; both accept `EnvFilter` directives.
pub fn init() {
    let default = if cfg!(debug_assertions) { "debug" } else { "info" };

    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| {
            EnvFilter::try_new(&level)
                .inspect_err(|_| {
                    eprintln!("Invalid log level specified {level}, defaulting to {default}");
                })
                .ok()
        })
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
