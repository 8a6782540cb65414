use thiserror::Error;

use crate::core::library::LibraryError;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("No Miro token found. Set MIRO_TOKEN in your .env file")]
    MissingToken,
    #[error("No board selected. Select a board or set MIRO_BOARD_ID")]
    MissingBoard,
    #[error("Invalid Miro token")]
    Unauthorized,
    #[error("Access denied: the token lacks the required permissions")]
    Forbidden,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Rate limit exceeded, wait a moment and try again")]
    RateLimited,
    #[error("Miro API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid board id: {0}")]
    InvalidBoardId(String),
    #[error("Batch {batch} is beyond available images ({total} batches)")]
    BatchOutOfRange { batch: usize, total: usize },
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON 数据解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl BoardError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => BoardError::Unauthorized,
            403 => BoardError::Forbidden,
            404 => BoardError::NotFound(message),
            429 => BoardError::RateLimited,
            _ => BoardError::Api { status, message },
        }
    }

    /// 稍后重试可能成功
    pub fn is_transient(&self) -> bool {
        match self {
            BoardError::RateLimited => true,
            BoardError::Api { status, .. } => *status >= 500,
            BoardError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
