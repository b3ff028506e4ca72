use tracing_subscriber::{fmt::format::FmtSpan, prelude::*, EnvFilter, Registry};

/// Installs the global subscriber: a fmt layer filtered by `RUST_LOG`, `info` when unset.
pub fn init() {
    let stdout_log = tracing_subscriber::fmt::layer().with_span_events(FmtSpan::CLOSE);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = Registry::default().with(filter).with(stdout_log);

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global subscriber: {e}");
    }
}
