// Tracing subscriber setup shared by the daemon and the CLI.
//
// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` when
// the config enables it. Logs go to stderr so CLI output on stdout stays
// machine-readable.

use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Value of the `service` field on the root span.
pub const SERVICE_NAME: &str = "notetally";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable lines.
    Text,
}

pub fn init(format: LogFormat, debug: bool) {
    let filter = env_filter(debug);
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().with_current_span(true).with_span_list(false).init(),
        LogFormat::Text => builder.with_target(false).init(),
    }
}

/// Root span carrying the service name. Everything the process does runs
/// inside it, so every JSON line has `"span":{"service":"notetally",..}`.
pub fn service_span() -> Span {
    tracing::info_span!("service", service = SERVICE_NAME)
}

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}
