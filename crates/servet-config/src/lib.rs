//! Configuration system for Servet.
//!
//! Provides TOML-based configuration with:
//! - Server, session and rate limit sections
//! - Config file layering (user config dir + project-local override)
//! - Interval strings (`"15m"`, `"500ms"`) for time windows

pub mod discovery;
pub mod error;
pub mod interval;
pub mod types;

pub use discovery::{
    LoadedConfig, PROJECT_CONFIG_FILE, config_dir, config_path, load_config, load_config_file,
    load_config_with_options, save_config,
};
pub use error::{ConfigError, Result};
pub use interval::{format_interval, parse_interval};
pub use types::*;
