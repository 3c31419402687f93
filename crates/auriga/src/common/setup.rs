use env_logger::DEFAULT_FILTER_ENV;
use log::LevelFilter;

/// Sets the behavior of the logger, based on the `--verbose` flag, the
/// `log_level` entry of the server configuration and environment variables
/// such as `RUST_LOG` (which takes precedence over both).
pub fn setup_logging(verbose: bool, config_level: Option<&str>) {
    let mut builder = env_logger::Builder::default();

    let level = if verbose {
        LevelFilter::Debug
    } else {
        config_level
            .and_then(|level| level.parse().ok())
            .unwrap_or(LevelFilter::Info)
    };
    builder.filter_level(level);

    let has_debug = std::env::var(DEFAULT_FILTER_ENV)
        .map(|v| v.contains("debug"))
        .unwrap_or(false);

    if verbose || has_debug {
        builder.format_timestamp_millis();
    } else {
        builder.format_timestamp_secs();
    }

    // Overwrite the defaults from env
    builder.parse_default_env();
    builder.init();
}
