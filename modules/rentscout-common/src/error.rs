use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    /// Network or upstream failure while fetching an area. Retried.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Content could not be parsed into listings. Retried like a fetch error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A record failed minimum-field or range checks.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Export or upload failure.
    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Aborts the whole run.
    #[error("Fatal error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<std::io::Error> for ScoutError {
    fn from(err: std::io::Error) -> Self {
        ScoutError::Sink(err.to_string())
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(err: serde_json::Error) -> Self {
        ScoutError::Sink(err.to_string())
    }
}
