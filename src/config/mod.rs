// Configuration management module
// TOML configuration for the target command, probe limits and the optional HTTP wrapper

pub mod settings;
pub mod show;

pub use settings::{Config, ConfigError, HttpConfig, ProbeConfig, TargetConfig};
pub use show::show_config;
