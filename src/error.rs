use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid export output: {0}")]
    Export(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table '{table}' exceeded its deadline of {limit:?}")]
    Timeout { table: String, limit: Duration },
}

impl ReconError {
    /// Whether the error aborts the whole run rather than a single table.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::ConfigParse(_))
    }
}
