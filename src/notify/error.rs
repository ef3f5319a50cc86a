use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("notification body could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
