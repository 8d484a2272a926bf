#![deny(missing_docs)]
//! Shared logging utilities for the generator workspace.
//!
//! Every crate logs through the `mslearn_*` macros below so the backend can be
//! swapped in one place. Backends are `simplelog` loggers installed by the
//! binary, or by [`initialize_for_tests`] in test code.

use log::LevelFilter;

/// Environment variable that overrides the default log level.
pub const LEVEL_ENV_VAR: &str = "MSLEARN_LOG";

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! mslearn_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! mslearn_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! mslearn_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! mslearn_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! mslearn_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Parses a level name such as `"debug"` or `"WARN"`.
///
/// Unknown names yield `None` so callers can fall back to their own default.
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Returns the level named by [`LEVEL_ENV_VAR`], or `default` when unset or unknown.
pub fn level_from_env(default: LevelFilter) -> LevelFilter {
    std::env::var(LEVEL_ENV_VAR)
        .ok()
        .and_then(|value| parse_level(&value))
        .unwrap_or(default)
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let fallback = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level_from_env(fallback),
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

#[cfg(test)]
mod tests {
    use super::parse_level;
    use log::LevelFilter;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::Debug));
        assert_eq!(parse_level(" warning "), Some(LevelFilter::Warn));
        assert_eq!(parse_level("loud"), None);
    }
}
