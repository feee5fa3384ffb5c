use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] channel::ChannelError),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod channel;
pub mod config;
pub mod correlate;
pub mod extract;
pub mod harness;
pub mod mcp;
pub mod probes;
pub mod report;
