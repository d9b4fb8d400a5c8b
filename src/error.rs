use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpendError {
    #[error("Unrecognized payload shape: {0}")]
    PayloadShape(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "fetch")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[cfg(feature = "fetch")]
    #[error("Billing API error (status {status}): {body}")]
    ApiError { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, SpendError>;
