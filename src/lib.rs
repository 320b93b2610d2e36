pub mod api;
pub mod core;
pub mod render;
pub mod scanner;
pub mod segments;

/// Installs the `env_logger` backend; `RUST_LOG` overrides `level`.
///
/// Calling it twice is harmless.
pub fn init_logging(level: log::LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
