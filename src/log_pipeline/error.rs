use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogPipelineError {
    #[error("search backend transport failure: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{failed} of {total} documents failed to index in bulk flush")]
    PartialFailure { failed: usize, total: usize },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
