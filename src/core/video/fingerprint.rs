use rayon::prelude::*;

use super::frame::Frame;

/// 色相分箱数（OpenCV 8 位 HSV 色相范围 [0, 180)）
pub const HUE_BINS: usize = 50;
/// 饱和度分箱数（范围 [0, 256)）
pub const SATURATION_BINS: usize = 60;

const BIN_COUNT: usize = HUE_BINS * SATURATION_BINS;
/// 每个并行分块包含的行数
const ROWS_PER_BAND: usize = 32;

/// 帧的颜色分布指纹：H×S 联合直方图，L2 归一化
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    bins: Vec<f32>,
}

impl Fingerprint {
    /// 计算帧指纹。纯函数：相同像素总是得到相同指纹
    pub fn of_frame(frame: &Frame) -> Self {
        let row_bytes = (frame.width as usize * 3).max(3);
        let band_bytes = row_bytes * ROWS_PER_BAND;

        let counts = frame
            .data
            .par_chunks(band_bytes)
            .map(|band| {
                let mut partial = vec![0u32; BIN_COUNT];
                for px in band.chunks_exact(3) {
                    let (h, s) = rgb_to_hs(px[0], px[1], px[2]);
                    partial[bin_index(h, s)] += 1;
                }
                partial
            })
            .reduce(
                || vec![0u32; BIN_COUNT],
                |mut acc, partial| {
                    for (a, p) in acc.iter_mut().zip(partial) {
                        *a += p;
                    }
                    acc
                },
            );

        Self::from_counts(&counts)
    }

    /// 由原始计数构造（L2 归一化）
    pub fn from_counts(counts: &[u32]) -> Self {
        let bins: Vec<f32> = counts.iter().map(|&c| c as f32).collect();
        Self::from_bins(bins)
    }

    /// 由任意非负权重构造（L2 归一化），便于合成测试数据
    pub fn from_bins(mut bins: Vec<f32>) -> Self {
        let norm = bins.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in bins.iter_mut() {
                *v /= norm;
            }
        }
        Self { bins }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Bhattacharyya 距离，取值 [0, 1]：0 表示分布相同
    pub fn distance(&self, other: &Fingerprint) -> f32 {
        if self.bins == other.bins {
            return 0.0;
        }

        let sum_a: f32 = self.bins.iter().sum();
        let sum_b: f32 = other.bins.iter().sum();
        if sum_a <= 0.0 || sum_b <= 0.0 {
            return 1.0;
        }

        let coefficient: f32 = self
            .bins
            .iter()
            .zip(other.bins.iter())
            .map(|(a, b)| (a * b).sqrt())
            .sum();

        let scaled = coefficient / (sum_a * sum_b).sqrt();
        (1.0 - scaled).max(0.0).sqrt().min(1.0)
    }
}

fn bin_index(hue: f32, saturation: f32) -> usize {
    let h = ((hue * HUE_BINS as f32 / 180.0) as usize).min(HUE_BINS - 1);
    let s = ((saturation * SATURATION_BINS as f32 / 256.0) as usize).min(SATURATION_BINS - 1);
    h * SATURATION_BINS + s
}

/// RGB → (H ∈ [0,180), S ∈ [0,255])，与 8 位 HSV 约定一致
fn rgb_to_hs(r: u8, g: u8, b: u8) -> (f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    if delta == 0.0 {
        return (0.0, saturation);
    }

    let mut hue = if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    (hue / 2.0, saturation)
}
