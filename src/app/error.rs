use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RssForwardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Feed writing error: {0}")]
    FeedWrite(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Generator '{id}' could not be created: {reason}")]
    Generator { id: String, reason: String },

    #[error("Page rendering error: {0}")]
    Render(String),

    #[error("Feed server error: {0}")]
    Server(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RssForwardError>;
