//! 会话设置：默认值、JSON5 配置文件、部分更新与校验

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::video::{ScanConfig, StabilizerConfig};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("读取配置文件失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("配置文件解析失败: {0}")]
    Parse(String),
    #[error("无效的设置: {0}")]
    Invalid(String),
}

/// 画布上的图片排列方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// 左右并排
    #[default]
    Horizontal,
    /// 上下排列
    Vertical,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Horizontal => write!(f, "horizontal"),
            Layout::Vertical => write!(f, "vertical"),
        }
    }
}

impl FromStr for Layout {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "horizontal" => Ok(Layout::Horizontal),
            "vertical" => Ok(Layout::Vertical),
            other => Err(SettingsError::Invalid(format!(
                "layout must be \"horizontal\" or \"vertical\", got \"{}\"",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 变化检测采样帧率
    pub target_fps: f64,
    /// 转场判定阈值，越小越敏感
    pub diff_threshold: f32,
    /// 发现变化后等待多久再截图（秒）
    pub transition_delay: f64,
    /// 关键帧与上传图片的宽度（像素）
    pub output_width: u32,
    /// 每个视频最多提取的关键帧数，0 表示不限
    pub max_frames: usize,
    /// 画面持续变化时最多顺延几次，不设置则一直等到画面稳定
    pub max_extensions: Option<u32>,
    pub chunk_size: usize,
    /// 画布上图片之间的间距（像素）
    pub image_spacing: u32,
    pub layout: Layout,
    pub output_dir: PathBuf,
    pub video_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_fps: 5.0,
            diff_threshold: 0.20,
            transition_delay: 1.0,
            output_width: 600,
            max_frames: 0,
            max_extensions: None,
            chunk_size: 50,
            image_spacing: 100,
            layout: Layout::Horizontal,
            output_dir: PathBuf::from("screenshots"),
            video_dir: PathBuf::from("video"),
        }
    }
}

impl Settings {
    /// 从 JSON5 文件加载，缺省字段使用默认值
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        let settings = Self::parse(&text)?;
        info!("⚙️ Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// 文件不存在时使用默认设置
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No settings file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings =
            json5::from_str(text).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(SettingsError::Invalid(format!(
                "target_fps must be positive, got {}",
                self.target_fps
            )));
        }
        if !(self.diff_threshold > 0.0 && self.diff_threshold < 1.0) {
            return Err(SettingsError::Invalid(format!(
                "diff_threshold must be in (0, 1), got {}",
                self.diff_threshold
            )));
        }
        if !(self.transition_delay.is_finite() && self.transition_delay >= 0.0) {
            return Err(SettingsError::Invalid(format!(
                "transition_delay must be >= 0, got {}",
                self.transition_delay
            )));
        }
        if self.chunk_size == 0 {
            return Err(SettingsError::Invalid("chunk_size must be > 0".to_string()));
        }
        Ok(())
    }

    /// 应用部分更新，返回变更描述；校验失败时设置保持不变
    pub fn apply(&mut self, patch: SettingsPatch) -> Result<Vec<String>, SettingsError> {
        let mut next = self.clone();
        let mut changes = Vec::new();

        if let Some(width) = patch.output_width {
            next.output_width = width;
            changes.push(format!("Image width: {}px", width));
        }
        if let Some(spacing) = patch.image_spacing {
            next.image_spacing = spacing;
            changes.push(format!("Image spacing: {}px", spacing));
        }
        if let Some(layout) = patch.layout {
            next.layout = layout.parse()?;
            changes.push(format!("Layout: {}", next.layout));
        }
        if let Some(max_frames) = patch.max_frames {
            next.max_frames = max_frames;
            changes.push(format!("Max frames: {}", max_frames));
        }
        if let Some(fps) = patch.target_fps {
            next.target_fps = fps;
            changes.push(format!("FPS: {}", fps));
        }
        if let Some(threshold) = patch.diff_threshold {
            next.diff_threshold = threshold;
            changes.push(format!("Change threshold: {}", threshold));
        }
        if let Some(delay) = patch.transition_delay {
            next.transition_delay = delay;
            changes.push(format!("Transition delay: {}s", delay));
        }
        if let Some(limit) = patch.max_extensions {
            next.max_extensions = if limit == 0 { None } else { Some(limit) };
            changes.push(format!("Max extensions: {}", limit));
        }

        next.validate()?;
        *self = next;
        Ok(changes)
    }

    /// 扫描期间使用的只读配置快照
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            target_fps: self.target_fps,
            chunk_size: self.chunk_size,
            max_frames: self.max_frames,
            stabilizer: StabilizerConfig {
                diff_threshold: self.diff_threshold,
                transition_delay: self.transition_delay,
                max_extensions: self.max_extensions,
            },
        }
    }
}

/// 设置的部分更新，None 表示保持原值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub output_width: Option<u32>,
    pub image_spacing: Option<u32>,
    pub layout: Option<String>,
    pub max_frames: Option<usize>,
    pub target_fps: Option<f64>,
    pub diff_threshold: Option<f32>,
    pub transition_delay: Option<f64>,
    /// 0 表示取消上限
    pub max_extensions: Option<u32>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.output_width.is_none()
            && self.image_spacing.is_none()
            && self.layout.is_none()
            && self.max_frames.is_none()
            && self.target_fps.is_none()
            && self.diff_threshold.is_none()
            && self.transition_delay.is_none()
            && self.max_extensions.is_none()
    }
}
