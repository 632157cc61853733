use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Realtime database is not configured")]
    NotConfigured,

    #[error("Invalid database key: {0}")]
    InvalidKey(String),

    #[error("Authentication error ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("API error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
