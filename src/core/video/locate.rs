use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::error::VideoError;

/// 在视频目录中查找文件：先精确匹配，再忽略大小写匹配
pub fn locate_video(video_dir: &Path, name: &str) -> Result<PathBuf, VideoError> {
    let exact = video_dir.join(name);
    if exact.is_file() {
        return Ok(exact);
    }

    let available = list_videos(video_dir);
    let wanted = name.to_lowercase();
    if let Some(found) = available.iter().find(|f| f.to_lowercase() == wanted) {
        debug!("Case-insensitive match: {} -> {}", name, found);
        return Ok(video_dir.join(found));
    }

    Err(VideoError::InputNotFound {
        name: name.to_string(),
        available,
    })
}

/// 视频目录下的文件名，按名称排序；目录不存在时为空
pub fn list_videos(video_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(video_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();
    names
}
