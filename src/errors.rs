use thiserror::Error;

#[derive(Debug, Error)]
pub enum UmbraError {
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("tile request failed: {0}")]
    Http(String),

    #[error("tile decoding failed: {0}")]
    Decode(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("GPU failure: {0}")]
    Gpu(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for UmbraError {
    fn from(e: reqwest::Error) -> Self {
        UmbraError::Http(e.to_string())
    }
}
