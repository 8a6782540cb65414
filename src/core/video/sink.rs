use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageError, RgbImage};
use log::debug;

use super::error::VideoError;
use super::frame::{resize_keep_width, Frame};

/// 本地关键帧的 JPEG 质量
pub const KEYFRAME_JPEG_QUALITY: u8 = 85;

/// 已确认的关键帧
#[derive(Debug, Clone)]
pub struct Keyframe {
    pub app_name: String,
    /// 同一应用内从 1 开始递增
    pub sequence: usize,
    pub timestamp: f64,
    pub image: RgbImage,
    pub path: Option<PathBuf>,
}

/// 接收确认后的关键帧并持久化
pub trait KeyframeSink {
    fn commit(&mut self, app_name: &str, timestamp: f64, frame: &Frame)
        -> Result<Keyframe, VideoError>;
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder.encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)?;
    }
    Ok(buffer)
}

/// 关键帧文件名：`<timestamp:.2>s.jpg`，重复时追加 `_<n>`
pub fn keyframe_file_name(timestamp: f64, duplicate: usize) -> String {
    if duplicate <= 1 {
        format!("{:.2}s.jpg", timestamp)
    } else {
        format!("{:.2}s_{}.jpg", timestamp, duplicate)
    }
}

/// 写入 `<output_dir>/<app_name>/` 目录的 JPEG 关键帧
pub struct DirectorySink {
    output_dir: PathBuf,
    output_width: u32,
    quality: u8,
    sequences: HashMap<String, usize>,
    written: HashSet<PathBuf>,
}

impl DirectorySink {
    pub fn new(output_dir: impl Into<PathBuf>, output_width: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_width,
            quality: KEYFRAME_JPEG_QUALITY,
            sequences: HashMap::new(),
            written: HashSet::new(),
        }
    }

    pub fn app_dir(&self, app_name: &str) -> PathBuf {
        self.output_dir.join(app_name)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// 同一次运行中时间戳相同的关键帧不互相覆盖
    fn unique_path(&mut self, app_dir: &Path, timestamp: f64) -> PathBuf {
        let mut duplicate = 1;
        loop {
            let candidate = app_dir.join(keyframe_file_name(timestamp, duplicate));
            if self.written.insert(candidate.clone()) {
                return candidate;
            }
            duplicate += 1;
        }
    }
}

impl KeyframeSink for DirectorySink {
    fn commit(
        &mut self,
        app_name: &str,
        timestamp: f64,
        frame: &Frame,
    ) -> Result<Keyframe, VideoError> {
        let image = resize_keep_width(frame.to_image()?, self.output_width);

        let app_dir = self.app_dir(app_name);
        fs::create_dir_all(&app_dir)?;
        let path = self.unique_path(&app_dir, timestamp);

        let jpeg = encode_jpeg(&image, self.quality)?;
        fs::write(&path, jpeg)?;

        let sequence = self.sequences.entry(app_name.to_string()).or_insert(0);
        *sequence += 1;
        debug!("💾 Saved {} (#{})", path.display(), sequence);

        Ok(Keyframe {
            app_name: app_name.to_string(),
            sequence: *sequence,
            timestamp,
            image,
            path: Some(path),
        })
    }
}

/// 仅保存在内存中的关键帧集合
pub struct MemorySink {
    output_width: u32,
    keyframes: Vec<Keyframe>,
}

impl MemorySink {
    pub fn new(output_width: u32) -> Self {
        Self {
            output_width,
            keyframes: Vec::new(),
        }
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn for_app<'a>(&'a self, app_name: &'a str) -> impl Iterator<Item = &'a Keyframe> + 'a {
        self.keyframes.iter().filter(move |k| k.app_name == app_name)
    }

    pub fn into_keyframes(self) -> Vec<Keyframe> {
        self.keyframes
    }
}

impl KeyframeSink for MemorySink {
    fn commit(
        &mut self,
        app_name: &str,
        timestamp: f64,
        frame: &Frame,
    ) -> Result<Keyframe, VideoError> {
        let image = resize_keep_width(frame.to_image()?, self.output_width);
        let sequence = self.for_app(app_name).count() + 1;
        let keyframe = Keyframe {
            app_name: app_name.to_string(),
            sequence,
            timestamp,
            image,
            path: None,
        };
        self.keyframes.push(keyframe.clone());
        Ok(keyframe)
    }
}
