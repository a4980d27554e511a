use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected store payload: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Unsupported data type: {0}")]
    UnsupportedCategory(String),
    #[error("Failed to download CSV file: {0}")]
    Fetch(String),
    #[error(transparent)]
    OperationFailed(#[from] StoreError),
    #[error("text generation failed: {0}")]
    GenerationFailed(String),
}

impl AppError {
    pub fn missing(fields: &str) -> Self {
        Self::Validation(format!("Missing required parameters: {fields}"))
    }
}
