use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor not found: {0}")]
    NotFound(i64),
    #[error("Target serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),
    #[error("Store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for MonitorError {
    fn from(err: sqlx::Error) -> Self {
        MonitorError::Store(err.to_string())
    }
}
