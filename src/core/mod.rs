pub mod board;
pub mod library;
pub mod session;
pub mod video;
