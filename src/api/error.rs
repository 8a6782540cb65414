use serde::{Deserialize, Serialize};

use crate::core::board::BoardError;
use crate::core::library::LibraryError;
use crate::core::session::SettingsError;
use crate::core::video::VideoError;

/// 宿主侧统一的错误类型，FRB 友好的设计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error_type: String,
    pub message: String,
}

impl ApiError {
    fn new(error_type: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<VideoError> for ApiError {
    fn from(e: VideoError) -> Self {
        let error_type = match &e {
            VideoError::InputNotFound { .. } => "InputNotFound",
            VideoError::DecodeOpen(_) => "DecodeOpen",
            VideoError::Decode(_) => "Decode",
            VideoError::InvalidFrame(_) => "InvalidFrame",
            VideoError::Image(_) => "Image",
            VideoError::Io(_) => "Io",
        };
        Self::new(error_type, e.to_string())
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        let error_type = match &e {
            SettingsError::Io(_) => "Io",
            SettingsError::Parse(_) => "SettingsParse",
            SettingsError::Invalid(_) => "InvalidSettings",
        };
        Self::new(error_type, e.to_string())
    }
}

impl From<LibraryError> for ApiError {
    fn from(e: LibraryError) -> Self {
        let error_type = match &e {
            LibraryError::AppFolderMissing(_) => "AppFolderMissing",
            LibraryError::NoImages(_) => "NoImages",
            LibraryError::Io(_) => "Io",
        };
        Self::new(error_type, e.to_string())
    }
}

impl From<BoardError> for ApiError {
    fn from(e: BoardError) -> Self {
        if let BoardError::Library(inner) = e {
            return inner.into();
        }
        let error_type = match &e {
            BoardError::MissingToken => "MissingToken",
            BoardError::MissingBoard => "MissingBoard",
            BoardError::Unauthorized => "Unauthorized",
            BoardError::Forbidden => "Forbidden",
            BoardError::NotFound(_) => "NotFound",
            BoardError::RateLimited => "RateLimited",
            BoardError::Api { .. } => "BoardApi",
            BoardError::InvalidBoardId(_) => "InvalidBoardId",
            BoardError::BatchOutOfRange { .. } => "BatchOutOfRange",
            BoardError::Http(_) => "Http",
            BoardError::Json(_) => "Json",
            BoardError::Image(_) => "Image",
            BoardError::Library(_) => "Library",
        };
        Self::new(error_type, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_video_error_conversion() {
        let err: ApiError = VideoError::InputNotFound {
            name: "demo.mp4".to_string(),
            available: vec!["a.mp4".to_string(), "b.mov".to_string()],
        }
        .into();
        assert_eq!(err.error_type, "InputNotFound");
        assert!(err.message.contains("demo.mp4"));
        assert!(err.message.contains("a.mp4, b.mov"));
    }

    #[test]
    fn test_board_library_error_unwrapped() {
        let err: ApiError = BoardError::Library(LibraryError::NoImages(PathBuf::from("x"))).into();
        assert_eq!(err.error_type, "NoImages");
    }

    #[test]
    fn test_display() {
        let err: ApiError = BoardError::RateLimited.into();
        assert!(err.to_string().starts_with("[RateLimited]"));
    }
}
