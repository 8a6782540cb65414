//! 会话：设置、已处理的应用、当前画布

pub mod settings;

use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::core::library;
use crate::core::video::{
    locate_video, open_video, DirectorySink, FrameSource, KeyframeScanner, ScanConfig, ScanReport,
    VideoError,
};

pub use settings::{Layout, Settings, SettingsError, SettingsPatch};

/// 超过该数量建议用户先检查图片
const REVIEW_THRESHOLD: usize = 15;
/// 超过该数量建议调整阈值或限制帧数
const TOO_MANY_THRESHOLD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCountAdvice {
    None,
    Review,
    TooMany,
}

impl ImageCountAdvice {
    pub fn for_count(count: usize) -> Self {
        if count > TOO_MANY_THRESHOLD {
            ImageCountAdvice::TooMany
        } else if count > REVIEW_THRESHOLD {
            ImageCountAdvice::Review
        } else {
            ImageCountAdvice::None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub app_name: String,
    pub video_path: Option<PathBuf>,
    pub app_dir: PathBuf,
    pub report: ScanReport,
    pub advice: ImageCountAdvice,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppStatus {
    pub app_name: String,
    /// None 表示应用文件夹不存在
    pub image_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub apps: Vec<AppStatus>,
    pub settings: Settings,
    pub board_id: Option<String>,
}

/// 一次扫描所需的设置快照，可在释放会话锁之后执行
#[derive(Debug, Clone)]
pub struct ScanJob {
    app_name: String,
    config: ScanConfig,
    output_dir: PathBuf,
    output_width: u32,
}

impl ScanJob {
    pub fn run<S>(&self, source: &mut S) -> ProcessSummary
    where
        S: FrameSource + ?Sized,
    {
        let scanner = KeyframeScanner::with_config(self.config.clone());
        let mut sink = DirectorySink::new(&self.output_dir, self.output_width);
        let report = scanner.scan(source, &mut sink, &self.app_name);
        let advice = ImageCountAdvice::for_count(report.keyframes_saved);

        ProcessSummary {
            app_name: self.app_name.clone(),
            video_path: None,
            app_dir: sink.app_dir(&self.app_name),
            report,
            advice,
        }
    }

    /// 打开视频并扫描；解码句柄在返回前释放
    pub fn run_video(&self, path: &Path) -> Result<ProcessSummary, VideoError> {
        let mut source = open_video(path)?;
        let mut summary = self.run(&mut source);
        summary.video_path = Some(path.to_path_buf());
        Ok(summary)
    }
}

pub struct Session {
    settings: Settings,
    /// clear 时恢复到这份设置
    initial: Settings,
    current_apps: Vec<String>,
    board_id: Option<String>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self {
            initial: settings.clone(),
            settings,
            current_apps: Vec::new(),
            board_id: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn configure(&mut self, patch: SettingsPatch) -> Result<Vec<String>, SettingsError> {
        let changes = self.settings.apply(patch)?;
        if !changes.is_empty() {
            info!("⚙️ Settings updated: {}", changes.join(", "));
        }
        Ok(changes)
    }

    pub fn apps(&self) -> &[String] {
        &self.current_apps
    }

    pub fn register_app(&mut self, app_name: &str) {
        if !self.current_apps.iter().any(|a| a == app_name) {
            self.current_apps.push(app_name.to_string());
        }
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub fn select_board(&mut self, board_id: impl Into<String>) {
        let board_id = board_id.into();
        info!("📋 Board selected: {}", board_id);
        self.board_id = Some(board_id);
    }

    pub fn app_dir(&self, app_name: &str) -> PathBuf {
        self.settings.output_dir.join(app_name)
    }

    pub fn status(&self) -> SessionStatus {
        let apps = self
            .current_apps
            .iter()
            .map(|app_name| {
                let app_dir = self.app_dir(app_name);
                AppStatus {
                    app_name: app_name.clone(),
                    image_count: app_dir.is_dir().then(|| library::count_images(&app_dir)),
                }
            })
            .collect();

        SessionStatus {
            apps,
            settings: self.settings.clone(),
            board_id: self.board_id.clone(),
        }
    }

    /// 忘记已处理的应用并恢复设置，不删除本地图片
    pub fn clear(&mut self) {
        self.current_apps.clear();
        self.settings = self.initial.clone();
        info!("🧹 Session cleared");
    }

    /// 登记应用并生成扫描快照，之后修改设置不影响该次扫描
    pub fn scan_job(&mut self, app_name: &str) -> ScanJob {
        self.register_app(app_name);
        ScanJob {
            app_name: app_name.to_string(),
            config: self.settings.scan_config(),
            output_dir: self.settings.output_dir.clone(),
            output_width: self.settings.output_width,
        }
    }

    /// 在视频目录中查找视频，返回路径和扫描快照
    pub fn video_job(
        &mut self,
        video_name: &str,
        app_name: &str,
    ) -> Result<(PathBuf, ScanJob), VideoError> {
        let path = locate_video(&self.settings.video_dir, video_name)?;
        Ok((path, self.scan_job(app_name)))
    }

    /// 在视频目录中查找视频并提取关键帧到 `<output_dir>/<app_name>/`
    pub fn process_video(
        &mut self,
        video_name: &str,
        app_name: &str,
    ) -> Result<ProcessSummary, VideoError> {
        let (path, job) = self.video_job(video_name, app_name)?;
        job.run_video(&path)
    }

    /// 处理宿主提供的帧来源
    pub fn process_source<S>(&mut self, source: &mut S, app_name: &str) -> ProcessSummary
    where
        S: FrameSource + ?Sized,
    {
        self.scan_job(app_name).run(source)
    }

    pub fn output_dir(&self) -> &Path {
        &self.settings.output_dir
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
