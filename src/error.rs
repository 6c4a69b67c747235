use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {
    /// An upstream collaborator (frame reader, detector, descriptor extractor) failed.
    /// Terminates the run.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TrackerError {
    pub fn source_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for TrackerError {
    fn from(err: opencv::Error) -> Self {
        Self::SourceUnavailable(err.to_string())
    }
}
