use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Video file not found: {name} (available: {})", available.join(", "))]
    InputNotFound { name: String, available: Vec<String> },
    #[error("Cannot open video: {0}")]
    DecodeOpen(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
