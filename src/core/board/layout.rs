//! 画布排版：图片以中心点定位，按批次换行（横向）或换列（纵向）

use crate::core::session::Layout;
use crate::models::board::{BoardItem, Position};

/// frame 左上角到第一张图片边缘的留白
pub const FRAME_PADDING: f64 = 300.0;
/// frame 缺少尺寸信息时的默认边长
pub const DEFAULT_FRAME_SIZE: f64 = 2000.0;
pub const MAX_IMAGES_PER_BATCH: usize = 20;
/// 批次之间额外的间隔
pub const BATCH_GAP: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// 在整个图片序列中的位置
    pub index: usize,
    /// 从 0 开始的批次号
    pub batch: usize,
    pub position: Position,
    pub width: u32,
    pub height: u32,
}

pub fn batch_count(total: usize, per_batch: usize) -> usize {
    let per_batch = per_batch.max(1);
    total.div_ceil(per_batch)
}

/// 第一张图片放在 frame 左上角留白之后（绝对坐标）
pub fn frame_start(frame: &BoardItem, first_width: u32, first_height: u32) -> Position {
    let center = frame.position.unwrap_or_default();
    let geometry = frame.geometry.unwrap_or_default();
    let frame_width = geometry.width.unwrap_or(DEFAULT_FRAME_SIZE);
    let frame_height = geometry.height.unwrap_or(DEFAULT_FRAME_SIZE);

    Position::new(
        center.x - frame_width / 2.0 + FRAME_PADDING + f64::from(first_width) / 2.0,
        center.y - frame_height / 2.0 + FRAME_PADDING + f64::from(first_height) / 2.0,
    )
}

/// 计算每张图片的中心坐标。
/// 横向：批内左右排列，每批另起一行；纵向：批内上下排列，每批另起一列
pub fn plan(
    sizes: &[(u32, u32)],
    start: Position,
    layout: Layout,
    spacing: f64,
    per_batch: usize,
) -> Vec<Placement> {
    let per_batch = per_batch.max(1);
    let mut placements = Vec::with_capacity(sizes.len());
    let mut origin = start;

    for (batch, chunk) in sizes.chunks(per_batch).enumerate() {
        let first = batch * per_batch;
        let mut position = origin;
        let mut previous: Option<(u32, u32)> = None;

        for (offset, &(width, height)) in chunk.iter().enumerate() {
            if let Some((prev_w, prev_h)) = previous {
                match layout {
                    Layout::Horizontal => {
                        position.x += f64::from(prev_w) / 2.0 + spacing + f64::from(width) / 2.0
                    }
                    Layout::Vertical => {
                        position.y += f64::from(prev_h) / 2.0 + spacing + f64::from(height) / 2.0
                    }
                }
            }
            placements.push(Placement {
                index: first + offset,
                batch,
                position,
                width,
                height,
            });
            previous = Some((width, height));
        }

        let max_width = chunk.iter().map(|s| s.0).max().unwrap_or(0);
        let max_height = chunk.iter().map(|s| s.1).max().unwrap_or(0);
        match layout {
            Layout::Horizontal => {
                origin = Position::new(start.x, origin.y + f64::from(max_height) + spacing + BATCH_GAP)
            }
            Layout::Vertical => {
                origin = Position::new(origin.x + f64::from(max_width) + spacing + BATCH_GAP, start.y)
            }
        }
    }

    placements
}
