//! Configuration file loading for shelfscan
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `SHELFSCAN_*` environment variables (`__` separates nested keys)
//! 2. `--config <path>` specified file
//! 3. Project root: `./shelfscan.toml` or `./.shelfscan.toml`
//! 4. Global: `$XDG_CONFIG_HOME/shelfscan/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigError, FileConfig, FileOutputConfig, FileProviderConfig, FileProvidersConfig,
    FileRunConfig, FileStageConfig,
};
pub use loader::ConfigLoader;
