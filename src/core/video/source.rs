use std::collections::VecDeque;
use std::path::Path;

use log::info;

use super::error::VideoError;
use super::frame::Frame;

/// 源视频未报告帧率时的默认值
pub const DEFAULT_FPS: f64 = 30.0;

/// 顺序解码的帧来源
pub trait FrameSource {
    /// 名义帧率，恒为正数
    fn nominal_fps(&self) -> f64;

    /// 读取下一帧；Ok(None) 表示流结束
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn nominal_fps(&self) -> f64 {
        (**self).nominal_fps()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        (**self).next_frame()
    }
}

/// 非正数或非有限的帧率回退到 30fps
pub fn normalize_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        DEFAULT_FPS
    }
}

/// 采样步长 every = max(round(nominal_fps / target_fps), 1)
pub fn sampling_stride(nominal_fps: f64, target_fps: f64) -> u64 {
    if !(target_fps.is_finite() && target_fps > 0.0) {
        return 1;
    }
    ((nominal_fps / target_fps).round() as u64).max(1)
}

/// 内存帧来源：由宿主逐帧推入像素，或在测试中构造合成视频。
/// 帧序号和时间戳由来源统一分配
pub struct MemoryFrameSource {
    fps: f64,
    frames: VecDeque<(u32, u32, Vec<u8>)>,
    next_index: u64,
}

impl MemoryFrameSource {
    pub fn new(fps: f64) -> Self {
        Self {
            fps: normalize_fps(fps),
            frames: VecDeque::new(),
            next_index: 0,
        }
    }

    pub fn push(&mut self, width: u32, height: u32, rgb: Vec<u8>) {
        self.frames.push_back((width, height, rgb));
    }

    pub fn push_solid(&mut self, width: u32, height: u32, rgb: [u8; 3]) {
        let frame = Frame::solid(width, height, rgb, 0, 0.0);
        self.push(width, height, frame.data);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemoryFrameSource {
    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        let Some((width, height, data)) = self.frames.pop_front() else {
            return Ok(None);
        };

        let expected = (width * height * 3) as usize;
        let index = self.next_index;
        self.next_index += 1;

        if data.len() != expected {
            return Err(VideoError::InvalidFrame(format!(
                "frame {} has {} bytes, expected {}",
                index,
                data.len(),
                expected
            )));
        }

        Ok(Some(Frame::new(
            width,
            height,
            data,
            index,
            index as f64 / self.fps,
        )))
    }
}

/// 打开视频文件。解码句柄随返回值的生命周期释放
#[cfg(feature = "ffmpeg")]
pub fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, VideoError> {
    info!("🎬 Opening video: {}", path.display());
    let source = super::ffmpeg_source::FfmpegFrameSource::open(path)?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ffmpeg"))]
pub fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, VideoError> {
    info!("🎬 Opening video: {}", path.display());
    Err(VideoError::DecodeOpen(format!(
        "{}: built without the `ffmpeg` feature",
        path.display()
    )))
}
