use image::{imageops, RgbImage};

use super::error::VideoError;

/// 解码后的视频帧（RGB24，行优先，无行填充）
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// 源视频中的帧序号（从 0 开始）
    pub index: u64,
    /// 名义时间戳（秒）= index / nominal_fps
    pub timestamp: f64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, index: u64, timestamp: f64) -> Self {
        Self {
            width,
            height,
            data,
            index,
            timestamp,
        }
    }

    /// 纯色帧，测试和占位场景使用
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], index: u64, timestamp: f64) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(width, height, data, index, timestamp)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn to_image(&self) -> Result<RgbImage, VideoError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            VideoError::InvalidFrame(format!(
                "buffer of {} bytes does not match {}x{} RGB",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }
}

/// 按目标宽度等比缩放；图像已经不宽于目标宽度（或目标为 0）时原样返回
pub fn resize_keep_width(img: RgbImage, target_width: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    if target_width == 0 || width <= target_width {
        return img;
    }

    let new_height = scaled_height(width, height, target_width);
    imageops::resize(&img, target_width, new_height, imageops::FilterType::Lanczos3)
}

/// new_height = round(height * target_width / width)，至少 1 像素
pub fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    let ratio = target_width as f64 / width as f64;
    ((height as f64 * ratio).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::solid(100, 50, [255, 0, 0], 30, 1.0);

        assert_eq!(frame.width, 100);
        assert_eq!(frame.height, 50);
        assert_eq!(frame.pixel_count(), 5000);
        assert_eq!(frame.data.len(), 15000);
        assert_eq!(&frame.data[..6], &[255, 0, 0, 255, 0, 0]);
        assert_eq!(frame.index, 30);
    }

    #[test]
    fn test_to_image_rejects_short_buffer() {
        let frame = Frame::new(10, 10, vec![0u8; 10], 0, 0.0);
        assert!(matches!(frame.to_image(), Err(VideoError::InvalidFrame(_))));
    }

    #[test]
    fn test_resize_narrower_image_is_unchanged() {
        let img = Frame::solid(320, 240, [10, 20, 30], 0, 0.0).to_image().unwrap();
        let resized = resize_keep_width(img.clone(), 600);
        assert_eq!(resized, img);
    }

    #[test]
    fn test_resize_zero_width_is_unchanged() {
        let img = Frame::solid(320, 240, [10, 20, 30], 0, 0.0).to_image().unwrap();
        let resized = resize_keep_width(img.clone(), 0);
        assert_eq!(resized.dimensions(), (320, 240));
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let img = Frame::solid(1170, 2532, [200, 200, 200], 0, 0.0)
            .to_image()
            .unwrap();
        let resized = resize_keep_width(img, 600);
        // 2532 * 600 / 1170 = 1298.46...
        assert_eq!(resized.dimensions(), (600, 1298));
    }

    #[test]
    fn test_scaled_height_rounds() {
        assert_eq!(scaled_height(1000, 333, 600), 200);
        assert_eq!(scaled_height(1920, 1080, 600), 338);
        assert_eq!(scaled_height(4000, 1, 600), 1);
    }
}
