//! Tracing/logging initialization.
//!
//! JSON logs with an env-driven filter. `RUST_LOG` wins when set; otherwise
//! the process logs at `info` with the sqlx level taken from `DB_LOG_LEVEL`
//! (silent/error/warn/info), so query noise can be tuned without touching
//! application logging.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

fn default_filter() -> EnvFilter {
    let db_level = std::env::var("DB_LOG_LEVEL").unwrap_or_default();
    EnvFilter::new(format!("info,sqlx={}", sqlx_directive(&db_level)))
}

fn sqlx_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "silent" => "off",
        "error" => "error",
        "info" => "info",
        // "warn" and anything unrecognized
        _ => "warn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_log_levels_map_to_directives() {
        assert_eq!(sqlx_directive("silent"), "off");
        assert_eq!(sqlx_directive("ERROR"), "error");
        assert_eq!(sqlx_directive("warn"), "warn");
        assert_eq!(sqlx_directive("info"), "info");
        assert_eq!(sqlx_directive(""), "warn");
        assert_eq!(sqlx_directive("debug"), "warn");
    }
}
