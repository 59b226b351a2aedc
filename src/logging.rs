use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "hybrid_gateway=info,tower_http=info";

/// Init logging using env variables LOG_LEVEL and LOG_FORMAT:
///     - LOG_LEVEL is an `EnvFilter` directive (RUST_LOG takes precedence)
///     - LOG_FORMAT may be `text` (default) or `json`
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json_output = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt().with_env_filter(filter).with_target(false);
    if json_output {
        builder.json().flatten_event(true).with_current_span(true).init();
    } else {
        builder.init();
    }
}
