use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("logic error: {0}")]
    Logic(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
