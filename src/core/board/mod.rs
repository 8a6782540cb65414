//! 画布（Miro）集成：客户端、排版与批量上传

pub mod client;
pub mod error;
pub mod layout;
pub mod uploader;

pub use client::{CanvasApi, MiroClient};
pub use error::BoardError;
pub use uploader::{BoardUploader, Pacing, UploadOptions, UploadReport, UploadRequest};
