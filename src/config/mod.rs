// Configuration management module
// Loads the TOML settings file, applies environment overrides and validates the result

pub mod display;
pub mod settings;

pub use display::show_config;
pub use settings::{Config, ConfigError, EmbeddingConfig, FieldNames};

