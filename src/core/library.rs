//! 本地截图库：`<output_dir>/<app>/` 下的关键帧与手动导入的截图

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
/// 导入摘要中展示的文件名数量
const SAMPLE_NAMES: usize = 5;

/// 关键帧文件名：`3.62s.jpg`、`3.62s_2.jpg`
static TIMESTAMP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?)s(?:_(\d+))?\.(?:jpe?g|png)$")
        .expect("timestamp pattern is valid")
});

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Folder not found: {0}")]
    AppFolderMissing(PathBuf),
    #[error("No images found in {0}")]
    NoImages(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalImage {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// 从文件名解析出的视频时间戳
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppImages {
    pub app_name: String,
    pub images: Vec<LocalImage>,
}

impl AppImages {
    pub fn total_bytes(&self) -> u64 {
        self.images.iter().map(|i| i.size_bytes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub app_name: String,
    pub app_dir: PathBuf,
    pub image_count: usize,
    pub total_bytes: u64,
    pub sample_names: Vec<String>,
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 解析关键帧文件名中的时间戳与重复序号
pub fn parse_timestamp(file_name: &str) -> Option<(f64, u32)> {
    let caps = TIMESTAMP_NAME.captures(file_name)?;
    let timestamp = caps.get(1)?.as_str().parse().ok()?;
    let duplicate = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    Some((timestamp, duplicate))
}

struct Entry {
    path: PathBuf,
    name: String,
    stamp: Option<(f64, u32)>,
    modified: SystemTime,
}

fn capture_order(a: &Entry, b: &Entry) -> Ordering {
    match (a.stamp, b.stamp) {
        (Some((ta, da)), Some((tb, db))) => ta
            .total_cmp(&tb)
            .then(da.cmp(&db))
            .then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a
            .modified
            .cmp(&b.modified)
            .then_with(|| a.name.cmp(&b.name)),
    }
}

/// 按拍摄顺序列出图片：能从文件名解析出时间戳的按时间戳排序，
/// 其余按修改时间排在后面
pub fn ordered_images(app_dir: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    if !app_dir.is_dir() {
        return Err(LibraryError::AppFolderMissing(app_dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(app_dir)? {
        let path = entry?.path();
        if !path.is_file() || !is_image(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let modified = fs::metadata(&path)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push(Entry {
            stamp: parse_timestamp(&name),
            path,
            name,
            modified,
        });
    }

    entries.sort_by(capture_order);
    Ok(entries.into_iter().map(|e| e.path).collect())
}

pub fn count_images(app_dir: &Path) -> usize {
    ordered_images(app_dir).map(|v| v.len()).unwrap_or(0)
}

fn describe(path: PathBuf) -> Result<LocalImage, LibraryError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let size_bytes = fs::metadata(&path)?.len();
    Ok(LocalImage {
        timestamp: parse_timestamp(&name).map(|(t, _)| t),
        name,
        path,
        size_bytes,
    })
}

/// 列出各应用的本地图片。`apps` 为空时列出输出目录下的所有应用文件夹；
/// 没有文件夹或没有图片的应用会被跳过
pub fn list_local_images(
    output_dir: &Path,
    apps: &[String],
) -> Result<Vec<AppImages>, LibraryError> {
    let apps: Vec<String> = if apps.is_empty() {
        discover_apps(output_dir)?
    } else {
        apps.to_vec()
    };

    let mut result = Vec::new();
    for app_name in apps {
        let app_dir = output_dir.join(&app_name);
        if !app_dir.is_dir() {
            debug!("Skipping {}: no folder", app_name);
            continue;
        }
        let images = ordered_images(&app_dir)?
            .into_iter()
            .map(describe)
            .collect::<Result<Vec<_>, _>>()?;
        if images.is_empty() {
            continue;
        }
        result.push(AppImages { app_name, images });
    }
    Ok(result)
}

fn discover_apps(output_dir: &Path) -> Result<Vec<String>, LibraryError> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut apps = Vec::new();
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                apps.push(name.to_string());
            }
        }
    }
    apps.sort();
    Ok(apps)
}

/// 登记用户手动放进 `<output_dir>/<app>/` 的截图
pub fn import_manual_screenshots(
    output_dir: &Path,
    app_name: &str,
) -> Result<ImportSummary, LibraryError> {
    let app_dir = output_dir.join(app_name);
    let images = ordered_images(&app_dir)?;
    if images.is_empty() {
        return Err(LibraryError::NoImages(app_dir));
    }

    let mut total_bytes = 0;
    for path in &images {
        total_bytes += fs::metadata(path)?.len();
    }
    let sample_names = images
        .iter()
        .take(SAMPLE_NAMES)
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();

    info!(
        "📥 Imported {} manual screenshots for '{}' ({} bytes)",
        images.len(),
        app_name,
        total_bytes
    );

    Ok(ImportSummary {
        app_name: app_name.to_string(),
        app_dir,
        image_count: images.len(),
        total_bytes,
        sample_names,
    })
}
