use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record changed between read and write.
    #[error("node status was modified concurrently")]
    Conflict,
    #[error("condition update timed out after {0:?}")]
    Timeout(Duration),
    #[error("node {0} not found")]
    NotFound(String),
    #[error("unknown condition status {0:?}")]
    InvalidStatus(String),
    #[error("remote store returned {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}
