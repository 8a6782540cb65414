//! 批量上传本地截图到画布

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use image::RgbImage;
use log::{info, warn};
use serde::Serialize;

use super::client::CanvasApi;
use super::error::BoardError;
use super::layout::{self, MAX_IMAGES_PER_BATCH};
use crate::core::library::{self, LibraryError};
use crate::core::session::{Layout, Settings};
use crate::core::video::{encode_jpeg, resize_keep_width};
use crate::models::board::Position;

/// 上传用 JPEG 质量
pub const UPLOAD_JPEG_QUALITY: u8 = 95;

/// 请求节奏，避免触发限流
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub between_images: Duration,
    pub between_batches: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_images: Duration::from_millis(500),
            between_batches: Duration::from_secs(2),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            between_images: Duration::ZERO,
            between_batches: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub output_width: u32,
    pub spacing: f64,
    pub layout: Layout,
    pub per_batch: usize,
}

impl UploadOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            output_width: settings.output_width,
            spacing: f64::from(settings.image_spacing),
            layout: settings.layout,
            per_batch: MAX_IMAGES_PER_BATCH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// 上传到该 frame 的左上角区域
    pub frame_id: Option<String>,
    /// 显式起点，优先于 frame 位置
    pub start: Option<Position>,
    /// 只上传第 n 批（从 1 开始）；None 表示全部
    pub batch: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadFailure {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReport {
    pub app_name: String,
    pub total_images: usize,
    pub batches: usize,
    pub batches_uploaded: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub failures: Vec<UploadFailure>,
    /// 只上传单批时，之后还剩多少张
    pub remaining: usize,
}

struct Prepared {
    name: String,
    image: RgbImage,
}

pub struct BoardUploader<'a, C: CanvasApi + ?Sized> {
    api: &'a C,
    board_id: String,
    options: UploadOptions,
    pacing: Pacing,
}

impl<'a, C: CanvasApi + ?Sized> BoardUploader<'a, C> {
    pub fn new(api: &'a C, board_id: impl Into<String>, options: UploadOptions) -> Self {
        Self {
            api,
            board_id: board_id.into(),
            options,
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// 按拍摄顺序上传 `app_dir` 下的图片。单张失败只计数，不中断上传
    pub fn upload_app(
        &self,
        app_name: &str,
        app_dir: &Path,
        request: &UploadRequest,
    ) -> Result<UploadReport, BoardError> {
        let paths = library::ordered_images(app_dir)?;
        if paths.is_empty() {
            return Err(LibraryError::NoImages(app_dir.to_path_buf()).into());
        }

        let per_batch = self.options.per_batch.max(1);
        let total_images = paths.len();
        let batches = layout::batch_count(total_images, per_batch);

        let (selected, first_batch) = match request.batch {
            None => (paths, 0),
            Some(batch) if batch >= 1 && batch <= batches => {
                let start = (batch - 1) * per_batch;
                let end = (start + per_batch).min(total_images);
                (paths[start..end].to_vec(), batch - 1)
            }
            Some(batch) => return Err(BoardError::BatchOutOfRange { batch, total: batches }),
        };
        let selected_count = selected.len();
        let remaining = total_images - (first_batch * per_batch + selected_count);

        info!(
            "📊 Uploading {} of {} images for '{}' to board {}",
            selected_count, total_images, app_name, self.board_id
        );

        let mut failures = Vec::new();
        let prepared = self.prepare(selected, &mut failures);
        if prepared.is_empty() {
            warn!("⚠️ No image of '{}' could be prepared", app_name);
        }

        let start = self.start_position(request, &prepared);
        let sizes: Vec<(u32, u32)> = prepared.iter().map(|p| p.image.dimensions()).collect();
        let placements = layout::plan(&sizes, start, self.options.layout, self.options.spacing, per_batch);

        let mut uploaded = 0;
        let mut batches_uploaded = 0;
        let mut current_batch = None;

        for (placement, item) in placements.iter().zip(&prepared) {
            if current_batch != Some(placement.batch) {
                if current_batch.is_some() {
                    info!("⏳ Brief pause between batches...");
                    thread::sleep(self.pacing.between_batches);
                }
                current_batch = Some(placement.batch);
                batches_uploaded += 1;
                info!(
                    "📦 Batch {}/{}",
                    first_batch + placement.batch + 1,
                    batches
                );
            } else {
                thread::sleep(self.pacing.between_images);
            }

            match self.upload_one(item, placement.position) {
                Ok(()) => {
                    uploaded += 1;
                    info!(
                        "  [{}/{}] {} -> ({:.0}, {:.0}) [{}×{}]",
                        placement.index + 1,
                        prepared.len(),
                        item.name,
                        placement.position.x,
                        placement.position.y,
                        placement.width,
                        placement.height
                    );
                }
                Err(e) => {
                    warn!("  {} -> FAILED: {}", item.name, e);
                    failures.push(UploadFailure {
                        name: item.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let failed = failures.len();
        if failed == 0 {
            info!("🎉 Uploaded {} images for '{}'", uploaded, app_name);
        } else {
            warn!(
                "⚠️ Uploaded {} images for '{}', {} failed",
                uploaded, app_name, failed
            );
        }

        Ok(UploadReport {
            app_name: app_name.to_string(),
            total_images,
            batches,
            batches_uploaded,
            uploaded,
            failed,
            failures,
            remaining,
        })
    }

    fn prepare(&self, paths: Vec<PathBuf>, failures: &mut Vec<UploadFailure>) -> Vec<Prepared> {
        let mut prepared = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            match image::open(&path) {
                Ok(img) => prepared.push(Prepared {
                    image: resize_keep_width(img.to_rgb8(), self.options.output_width),
                    name,
                }),
                Err(e) => {
                    warn!("⚠️ Cannot read {}: {}", path.display(), e);
                    failures.push(UploadFailure {
                        name,
                        message: e.to_string(),
                    });
                }
            }
        }
        prepared
    }

    /// 显式起点 > frame 左上角 > 原点；frame 查询失败时回到原点
    fn start_position(&self, request: &UploadRequest, prepared: &[Prepared]) -> Position {
        if let Some(start) = request.start {
            return start;
        }
        let (Some(frame_id), Some(first)) = (request.frame_id.as_deref(), prepared.first()) else {
            return Position::default();
        };

        match self.api.get_item(&self.board_id, frame_id) {
            Ok(frame) => {
                let start = layout::frame_start(&frame, first.image.width(), first.image.height());
                info!(
                    "📍 Frame {} - starting at ({:.0}, {:.0})",
                    frame_id, start.x, start.y
                );
                start
            }
            Err(e) => {
                warn!(
                    "⚠️ Could not get frame {} position: {}, using (0, 0)",
                    frame_id, e
                );
                Position::default()
            }
        }
    }

    fn upload_one(&self, item: &Prepared, position: Position) -> Result<(), BoardError> {
        let jpeg = encode_jpeg(&item.image, UPLOAD_JPEG_QUALITY)?;
        self.api
            .upload_image(&self.board_id, &item.name, jpeg, position)?;
        Ok(())
    }
}
