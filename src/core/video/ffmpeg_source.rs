//! FFmpeg 解码帧来源（ffmpeg-next）

use std::path::Path;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::decoder::Video as VideoDecoder;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::frame::Video as VideoFrame;
use log::{debug, info, warn};

use super::error::VideoError;
use super::frame::Frame;
use super::source::{normalize_fps, FrameSource};

pub struct FfmpegFrameSource {
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    /// 首帧到来后才知道源像素格式，延迟创建
    scaler: Option<ScalingContext>,
    width: u32,
    height: u32,
    fps: f64,
    next_index: u64,
    eof_sent: bool,
    path: String,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        ffmpeg_next::init().map_err(|e| VideoError::DecodeOpen(format!("ffmpeg init: {}", e)))?;

        if !path.exists() {
            return Err(VideoError::InputNotFound {
                name: path.display().to_string(),
                available: Vec::new(),
            });
        }

        let input = ffmpeg_next::format::input(&path)
            .map_err(|e| VideoError::DecodeOpen(format!("{}: {}", path.display(), e)))?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| {
                VideoError::DecodeOpen(format!("no video stream in {}", path.display()))
            })?;
        let stream_index = stream.index();

        let reported_fps = f64::from(stream.avg_frame_rate());
        let fps = normalize_fps(reported_fps);
        if fps != reported_fps {
            warn!(
                "⚠️ {}: stream reports no frame rate, assuming {:.1} fps",
                path.display(),
                fps
            );
        }

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| VideoError::DecodeOpen(format!("decoder: {}", e)))?;

        let width = decoder.width();
        let height = decoder.height();

        info!(
            "📼 Opened {}: {}x{} @ {:.2} fps",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            scaler: None,
            width,
            height,
            fps,
            next_index: 0,
            eof_sent: false,
            path: path.display().to_string(),
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg_next::Packet> {
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }

    fn convert(&mut self, decoded: &VideoFrame) -> Result<Frame, VideoError> {
        if self.scaler.is_none() {
            let scaler = ScalingContext::get(
                decoded.format(),
                self.width,
                self.height,
                Pixel::RGB24,
                self.width,
                self.height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|e| VideoError::Decode(format!("scaler: {}", e)))?;
            self.scaler = Some(scaler);
        }

        let mut rgb = VideoFrame::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .run(decoded, &mut rgb)
                .map_err(|e| VideoError::Decode(format!("scale: {}", e)))?;
        }

        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data(0);
        let mut data = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * stride;
            let end = start + row_bytes;
            if end > plane.len() {
                return Err(VideoError::Decode(format!(
                    "short RGB plane at row {}",
                    y
                )));
            }
            data.extend_from_slice(&plane[start..end]);
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Frame::new(
            self.width,
            self.height,
            data,
            index,
            index as f64 / self.fps,
        ))
    }
}

impl FrameSource for FfmpegFrameSource {
    fn nominal_fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        loop {
            let mut decoded = VideoFrame::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            match self.next_packet() {
                Some(packet) => {
                    // 单个损坏的数据包跳过即可
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        warn!("⚠️ {}: skipping bad packet: {}", self.path, e);
                    }
                }
                None => {
                    debug!("{}: end of packets, draining decoder", self.path);
                    self.decoder.send_eof().ok();
                    self.eof_sent = true;
                }
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        info!(
            "🗑️ {}: decoder released after {} frames",
            self.path, self.next_index
        );
    }
}
