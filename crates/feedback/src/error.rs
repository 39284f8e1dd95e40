use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedbackError>;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Completion service error: {0}")]
    CompletionService(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] civic_retrieval::RetrievalError),

    #[error("Facts error: {0}")]
    Facts(#[from] civic_facts::FactsError),
}
