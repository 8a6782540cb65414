//! UX 基准会话：视频抽取关键帧 → 本地审阅 → 上传到画布

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use flutter_rust_bridge::frb;
use log::info;

use super::dto::{
    AppImagesInfo, BoardInfo, FrameInfo, ImportInfo, ProcessResult, RgbFrameData, SettingsInfo,
    StatusInfo, UploadResult,
};
use super::error::ApiError;
use crate::core::board::{BoardError, BoardUploader, MiroClient, UploadOptions, UploadRequest};
use crate::core::library;
use crate::core::session::{Session, Settings, SettingsPatch};
use crate::core::video::MemoryFrameSource;

/// 会话句柄
///
/// ```dart
/// final session = BenchmarkSession.create();
/// final result = await session.processVideo(videoName: "demo.mp4", appName: "Willow");
/// await session.uploadImages(appName: "Willow");
/// ```
#[frb(opaque)]
pub struct BenchmarkSession {
    session: Mutex<Session>,
}

impl BenchmarkSession {
    /// 使用默认设置创建会话
    #[frb(sync)]
    pub fn create() -> Self {
        info!("🎬 BenchmarkSession: created");
        Self::with_settings(Settings::default())
    }

    /// 从 JSON5 配置文件创建会话，文件不存在时使用默认设置
    #[frb(sync)]
    pub fn create_with_config(path: String) -> Result<Self, ApiError> {
        let settings = Settings::load_or_default(&PathBuf::from(path))?;
        info!("🎬 BenchmarkSession: created with config");
        Ok(Self::with_settings(settings))
    }

    fn with_settings(settings: Settings) -> Self {
        Self {
            session: Mutex::new(Session::new(settings)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 部分更新设置，返回变更列表
    #[frb(sync)]
    pub fn configure(&self, patch: SettingsPatch) -> Result<Vec<String>, ApiError> {
        Ok(self.lock().configure(patch)?)
    }

    #[frb(sync, getter)]
    pub fn settings(&self) -> SettingsInfo {
        SettingsInfo::from(self.lock().settings())
    }

    #[frb(sync)]
    pub fn status(&self) -> StatusInfo {
        StatusInfo::from(self.lock().status())
    }

    /// 清空会话（不删除本地图片）
    #[frb(sync)]
    pub fn clear(&self) {
        self.lock().clear()
    }

    /// 从视频目录中的视频提取关键帧；解码期间不持有会话锁
    #[frb]
    pub fn process_video(
        &self,
        video_name: String,
        app_name: String,
    ) -> Result<ProcessResult, ApiError> {
        let (path, job) = self.lock().video_job(&video_name, &app_name)?;
        let summary = job.run_video(&path)?;
        Ok(summary.into())
    }

    /// 处理宿主解码好的 RGB 帧，按 `fps` 分配时间戳
    #[frb]
    pub fn process_frames(
        &self,
        frames: Vec<RgbFrameData>,
        fps: f64,
        app_name: String,
    ) -> Result<ProcessResult, ApiError> {
        let mut source = MemoryFrameSource::new(fps);
        for frame in frames {
            source.push(frame.width, frame.height, frame.rgb);
        }
        info!(
            "🎞️ BenchmarkSession: {} host frame(s) for '{}'",
            source.remaining(),
            app_name
        );

        let job = self.lock().scan_job(&app_name);
        Ok(job.run(&mut source).into())
    }

    /// 列出本地图片；不指定应用时列出会话中的应用，会话为空则列出输出目录下的全部应用
    #[frb]
    pub fn list_local_images(&self, app_name: Option<String>) -> Result<Vec<AppImagesInfo>, ApiError> {
        let session = self.lock();
        let apps = match app_name {
            Some(app) => vec![app],
            None => session.apps().to_vec(),
        };
        let listed = library::list_local_images(session.output_dir(), &apps)?;
        Ok(listed.into_iter().map(AppImagesInfo::from).collect())
    }

    /// 登记手动放入 `<output_dir>/<app_name>/` 的截图
    #[frb]
    pub fn import_manual_screenshots(&self, app_name: String) -> Result<ImportInfo, ApiError> {
        let mut session = self.lock();
        let summary = library::import_manual_screenshots(session.output_dir(), &app_name)?;
        session.register_app(&app_name);
        Ok(summary.into())
    }

    #[frb]
    pub fn list_boards(&self) -> Result<Vec<BoardInfo>, ApiError> {
        let client = MiroClient::from_env()?;
        let boards = client.list_boards()?;
        Ok(boards.into_iter().map(BoardInfo::from).collect())
    }

    /// 校验画布可访问后设为上传目标
    #[frb]
    pub fn select_board(&self, board_id: String) -> Result<BoardInfo, ApiError> {
        let client = MiroClient::from_env()?;
        let board = client.get_board(&board_id)?;
        self.lock().select_board(board_id);
        Ok(board.into())
    }

    #[frb]
    pub fn list_frames(&self, board_id: Option<String>) -> Result<Vec<FrameInfo>, ApiError> {
        let board_id = self.resolve_board(board_id)?;
        let client = MiroClient::from_env()?;
        let frames = client.list_frames(&board_id)?;
        Ok(frames.into_iter().map(FrameInfo::from).collect())
    }

    /// 按拍摄顺序上传某个应用的图片；`batch` 为空时自动上传全部批次
    #[frb]
    pub fn upload_images(
        &self,
        app_name: String,
        frame_id: Option<String>,
        batch: Option<u32>,
    ) -> Result<UploadResult, ApiError> {
        let board_id = self.resolve_board(None)?;
        let client = MiroClient::from_env()?;
        let (options, app_dir) = {
            let session = self.lock();
            (
                UploadOptions::from_settings(session.settings()),
                session.app_dir(&app_name),
            )
        };

        let request = UploadRequest {
            frame_id,
            start: None,
            batch: batch.map(|b| b as usize),
        };
        let report =
            BoardUploader::new(&client, board_id, options).upload_app(&app_name, &app_dir, &request)?;
        Ok(report.into())
    }

    fn resolve_board(&self, explicit: Option<String>) -> Result<String, BoardError> {
        explicit
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.lock().board_id().map(str::to_string))
            .or_else(MiroClient::default_board_id)
            .ok_or(BoardError::MissingBoard)
    }
}

impl Drop for BenchmarkSession {
    fn drop(&mut self) {
        info!("🗑️ BenchmarkSession: released");
    }
}
