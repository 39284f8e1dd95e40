use thiserror::Error;

pub type Result<T> = std::result::Result<T, FactsError>;

#[derive(Error, Debug)]
pub enum FactsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid fact: {0}")]
    InvalidFact(String),
}
