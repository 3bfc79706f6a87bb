//! Logger setup on top of the `log` facade.

use env_logger::{Builder, Env};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// `env_logger` filter, e.g. "info" or "shape_scenes=debug,gfx_backend_vulkan=warn".
    /// `RUST_LOG` still wins when it is set.
    pub filter: Option<String>,
}

/// Installs the global logger. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    let filter = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let mut builder = Builder::from_env(Env::default().default_filter_or(filter));

    if builder.try_init().is_ok() {
        log::debug!("logging initialized with default filter {:?}", filter);
    }
}
