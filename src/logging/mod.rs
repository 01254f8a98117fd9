use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Installs the global subscriber with `info` as the default level.
/// `RUST_LOG` overrides it.
pub fn init_logging() {
    init_logging_with("info");
}

/// Installs the global subscriber. Calling it again after a subscriber is set
/// leaves the first one in place.
pub fn init_logging_with(default_directive: &str) {
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let formatting_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let subscriber = Registry::default().with(filter).with(formatting_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}
