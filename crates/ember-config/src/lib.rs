//! Configuration system for Ember.
//!
//! Provides TOML-based configuration with:
//! - A `[redis]` section for the backing store connection
//! - A `[session]` section mapping onto the registry settings
//! - Config file layering (XDG user config + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
