//! Engine-wide constants.

pub const ENGINE_NAME: &str = "Vitaport";
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hard ceiling on import payload size, checked before any parsing.
pub const MAX_IMPORT_BYTES: usize = 256 * 1024 * 1024;

/// Default `tracing` filter for binaries embedding the engine. The library
/// itself never installs a subscriber.
pub fn default_log_filter() -> &'static str {
    "info,vitaport=debug"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_version_matches_cargo() {
        assert_eq!(ENGINE_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn log_filter_scopes_engine_to_debug() {
        assert!(default_log_filter().contains("vitaport=debug"));
    }

    #[test]
    fn log_filter_is_a_valid_env_filter() {
        assert!(tracing_subscriber::EnvFilter::try_new(default_log_filter()).is_ok());
    }
}
