//! 暴露给宿主的数据结构，路径统一转成字符串

use crate::core::board::UploadReport;
use crate::core::library::{AppImages, ImportSummary};
use crate::core::session::{ImageCountAdvice, Layout, ProcessSummary, SessionStatus, Settings};
use crate::core::video::{KeyframeRecord, ScanAction, ScanEvent};
use crate::models::board::{BoardItem, BoardSummary};

/// 宿主解码好的一帧，RGB24 行优先
#[derive(Debug, Clone)]
pub struct RgbFrameData {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SettingsInfo {
    pub target_fps: f64,
    pub diff_threshold: f32,
    pub transition_delay: f64,
    pub output_width: u32,
    pub max_frames: u64,
    pub max_extensions: Option<u32>,
    pub image_spacing: u32,
    pub layout: Layout,
    pub output_dir: String,
    pub video_dir: String,
}

impl From<&Settings> for SettingsInfo {
    fn from(s: &Settings) -> Self {
        Self {
            target_fps: s.target_fps,
            diff_threshold: s.diff_threshold,
            transition_delay: s.transition_delay,
            output_width: s.output_width,
            max_frames: s.max_frames as u64,
            max_extensions: s.max_extensions,
            image_spacing: s.image_spacing,
            layout: s.layout,
            output_dir: s.output_dir.display().to_string(),
            video_dir: s.video_dir.display().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyframeInfo {
    pub sequence: u64,
    pub timestamp: f64,
    pub change_time: Option<f64>,
    pub action: ScanAction,
    pub width: u32,
    pub height: u32,
    pub path: Option<String>,
}

impl From<&KeyframeRecord> for KeyframeInfo {
    fn from(k: &KeyframeRecord) -> Self {
        Self {
            sequence: k.sequence as u64,
            timestamp: k.timestamp,
            change_time: k.change_time,
            action: k.action,
            width: k.width,
            height: k.height,
            path: k.path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub app_name: String,
    pub app_dir: String,
    pub keyframes_saved: u64,
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub frames_skipped: u64,
    pub save_failures: u64,
    pub cap_reached: bool,
    pub advice: ImageCountAdvice,
    pub keyframes: Vec<KeyframeInfo>,
    pub events: Vec<ScanEvent>,
}

impl From<ProcessSummary> for ProcessResult {
    fn from(s: ProcessSummary) -> Self {
        Self {
            app_name: s.app_name,
            app_dir: s.app_dir.display().to_string(),
            keyframes_saved: s.report.keyframes_saved as u64,
            frames_read: s.report.frames_read,
            frames_sampled: s.report.frames_sampled,
            frames_skipped: s.report.frames_skipped,
            save_failures: s.report.save_failures as u64,
            cap_reached: s.report.cap_reached,
            advice: s.advice,
            keyframes: s.report.keyframes.iter().map(KeyframeInfo::from).collect(),
            events: s.report.events,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppStatusInfo {
    pub app_name: String,
    pub image_count: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub apps: Vec<AppStatusInfo>,
    pub settings: SettingsInfo,
    pub board_id: Option<String>,
}

impl From<SessionStatus> for StatusInfo {
    fn from(s: SessionStatus) -> Self {
        Self {
            apps: s
                .apps
                .into_iter()
                .map(|a| AppStatusInfo {
                    app_name: a.app_name,
                    image_count: a.image_count.map(|c| c as u64),
                })
                .collect(),
            settings: SettingsInfo::from(&s.settings),
            board_id: s.board_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalImageInfo {
    pub name: String,
    pub path: String,
    pub size_bytes: u64,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AppImagesInfo {
    pub app_name: String,
    pub total_bytes: u64,
    pub images: Vec<LocalImageInfo>,
}

impl From<AppImages> for AppImagesInfo {
    fn from(a: AppImages) -> Self {
        Self {
            total_bytes: a.total_bytes(),
            app_name: a.app_name,
            images: a
                .images
                .into_iter()
                .map(|i| LocalImageInfo {
                    name: i.name,
                    path: i.path.display().to_string(),
                    size_bytes: i.size_bytes,
                    timestamp: i.timestamp,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportInfo {
    pub app_name: String,
    pub app_dir: String,
    pub image_count: u64,
    pub total_bytes: u64,
    pub sample_names: Vec<String>,
}

impl From<ImportSummary> for ImportInfo {
    fn from(s: ImportSummary) -> Self {
        Self {
            app_name: s.app_name,
            app_dir: s.app_dir.display().to_string(),
            image_count: s.image_count as u64,
            total_bytes: s.total_bytes,
            sample_names: s.sample_names,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoardInfo {
    pub id: String,
    pub name: String,
    pub created_at: Option<String>,
}

impl From<BoardSummary> for BoardInfo {
    fn from(b: BoardSummary) -> Self {
        Self {
            id: b.id,
            name: if b.name.is_empty() {
                "Unnamed Board".to_string()
            } else {
                b.name
            },
            created_at: b.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub id: String,
    pub title: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl From<BoardItem> for FrameInfo {
    fn from(item: BoardItem) -> Self {
        let geometry = item.geometry.unwrap_or_default();
        Self {
            title: item.title().to_string(),
            x: item.position.map(|p| p.x),
            y: item.position.map(|p| p.y),
            width: geometry.width,
            height: geometry.height,
            id: item.id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub app_name: String,
    pub total_images: u64,
    pub batches: u64,
    pub uploaded: u64,
    pub failed: u64,
    pub failed_names: Vec<String>,
    pub remaining: u64,
}

impl From<UploadReport> for UploadResult {
    fn from(r: UploadReport) -> Self {
        Self {
            app_name: r.app_name,
            total_images: r.total_images as u64,
            batches: r.batches as u64,
            uploaded: r.uploaded as u64,
            failed: r.failed as u64,
            failed_names: r.failures.into_iter().map(|f| f.name).collect(),
            remaining: r.remaining as u64,
        }
    }
}
