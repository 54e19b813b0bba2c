//! Telemetry initialization.
//!
//! Controlled by `REMERGE_LOG` (an `EnvFilter` directive string):
//! - unset → no-op (tracing disabled, zero overhead)
//! - e.g. `"info"` or `"remerge=debug"` → JSON spans/events to stderr
//!
//! Result rows go to the result stream and colorized lines to stdout;
//! tracing is strictly diagnostic and never mixes into either.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "REMERGE_LOG";

/// Initialize telemetry based on `REMERGE_LOG`.
///
/// Safe to call once at process start; a second call is a no-op error
/// swallowed by the subscriber library.
pub fn init() {
    let Ok(directive) = std::env::var(LOG_ENV) else {
        return;
    };
    if directive.is_empty() {
        return;
    }

    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
}
