//! Configuration for the Terra surface renderer.
//!
//! Settings persist to disk as `config.ron`. Missing sections and fields fall
//! back to defaults, unknown fields are ignored, and command-line flags
//! override individual values after loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, CacheConfig, Config, DebugConfig, LodConfig, SurfaceConfig, ViewConfig,
    default_config_dir,
};
pub use error::ConfigError;
