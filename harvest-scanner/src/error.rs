use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Render failed for {url}: {reason}")]
    RenderFailed { url: String, reason: String },

    #[error("Not supported by this renderer: {0}")]
    Unsupported(String),

    #[error("Could not start session at {url}: {reason}")]
    SessionStart { url: String, reason: String },

    #[error("Invalid dispatcher budget: {0}")]
    InvalidBudget(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
