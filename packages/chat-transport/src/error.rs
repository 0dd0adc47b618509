use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("chat API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request to chat API failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
