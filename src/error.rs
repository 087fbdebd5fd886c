use thiserror::Error;

#[derive(Error, Debug)]
pub enum LucyError {
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Failed to generate query: {0}")]
    Generation(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Failed to generate explanation: {0}")]
    Explanation(String),

    #[error("Failed to generate chart configuration: {0}")]
    ChartConfig(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LucyError {
    /// True for errors caused by the caller's input rather than an upstream service.
    pub fn is_input(&self) -> bool {
        matches!(self, LucyError::Input(_))
    }
}

pub type Result<T> = std::result::Result<T, LucyError>;
