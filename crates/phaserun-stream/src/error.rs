use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("phase request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("phase response has no readable body")]
    NoBody,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

impl StreamError {
    /// `true` when the backend refused the request before streaming began.
    pub fn is_rejection(&self) -> bool {
        matches!(self, StreamError::Rejected { .. } | StreamError::NoBody)
    }
}
