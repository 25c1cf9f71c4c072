//! Tracing subscriber setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Install a console subscriber at `log_level`.
///
/// `RUST_LOG` takes precedence over the given level. Calling this more than
/// once is harmless; later calls leave the first subscriber in place.
pub fn init_logging(log_level: &str) {
    let level = parse_log_level(log_level).to_string().to_lowercase();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let installed = tracing_subscriber::fmt()
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(env_filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("logging initialized: level={}", level);
    }
}

/// Parse a level name, falling back to INFO for anything unrecognised.
pub fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Level::TRACE);
        assert_eq!(parse_log_level("debug"), Level::DEBUG);
        assert_eq!(parse_log_level("info"), Level::INFO);
        assert_eq!(parse_log_level("warn"), Level::WARN);
        assert_eq!(parse_log_level("error"), Level::ERROR);
        assert_eq!(parse_log_level("invalid"), Level::INFO);
    }

    #[test]
    fn test_parse_log_level_case_insensitive() {
        assert_eq!(parse_log_level("INFO"), Level::INFO);
        assert_eq!(parse_log_level("WARNING"), Level::WARN);
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("debug");
        init_logging("info");
    }
}
