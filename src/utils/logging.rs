// Tue Jan 13 2026 - Alex

use log::LevelFilter;

pub struct LoggingUtils;

impl LoggingUtils {
    /// Installs `env_logger` at `level`. `RUST_LOG`, when set, still refines
    /// per-module filters. A second call is a no-op.
    pub fn init_logger(level: LevelFilter) {
        env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .format_timestamp(None)
            .try_init()
            .ok();
    }

    pub fn level_from_str(s: &str) -> Option<LevelFilter> {
        match s.to_lowercase().as_str() {
            "error" => Some(LevelFilter::Error),
            "warn" | "warning" => Some(LevelFilter::Warn),
            "info" => Some(LevelFilter::Info),
            "debug" => Some(LevelFilter::Debug),
            "trace" => Some(LevelFilter::Trace),
            "off" => Some(LevelFilter::Off),
            _ => None,
        }
    }
}
