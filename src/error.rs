use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Structurally invalid input handed to a component, e.g. a snapshot with a
    /// negative allocated budget. Indicates a caller bug, not a runtime condition.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Analysis provider error: {0}")]
    Upstream(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[cfg(feature = "gemini")]
impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
