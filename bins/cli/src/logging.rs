//! `tracing` subscriber setup. Logs always go to stderr.

use crate::format::OutputFormat;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `directive` (derived from `service.logLevel`).
/// Machine-readable output modes get JSON log lines.
pub fn init_tracing(directive: &str, format: OutputFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        OutputFormat::Text => builder.try_init(),
        OutputFormat::Json | OutputFormat::Ndjson => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
