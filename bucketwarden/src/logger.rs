//! Logger bootstrap.
//!
//! `RUST_LOG` is honoured; an explicit level from the command line wins over it.

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initializes `env_logger` once. Later calls are ignored so tests may call it freely.
pub fn init_logger(level: Option<LevelFilter>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

/// Maps the `--debug` / `--quiet` flags to an override level.
pub fn level_from_flags(debug: bool, quiet: bool) -> Option<LevelFilter> {
    match (debug, quiet) {
        (true, _) => Some(LevelFilter::Debug),
        (false, true) => Some(LevelFilter::Warn),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_to_level() {
        assert_eq!(level_from_flags(true, false), Some(LevelFilter::Debug));
        assert_eq!(level_from_flags(false, true), Some(LevelFilter::Warn));
        assert_eq!(level_from_flags(false, false), None);
    }
}
