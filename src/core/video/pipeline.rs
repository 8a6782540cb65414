//! 分块扫描驱动：FrameSource → 采样 → 指纹 → 状态机 → KeyframeSink

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use super::error::VideoError;
use super::fingerprint::Fingerprint;
use super::frame::Frame;
use super::sink::KeyframeSink;
use super::source::{sampling_stride, FrameSource};
use super::state_machine::{Capture, CaptureKind, Decision, Stabilizer, StabilizerConfig};

/// 连续读帧失败达到该次数后视为流结束
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 16;

/// 一次扫描的配置快照，扫描期间不变
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// 变化检测的采样帧率
    pub target_fps: f64,
    /// 每次从来源读取的帧数，只影响峰值内存
    pub chunk_size: usize,
    /// 关键帧上限，0 表示不限
    pub max_frames: usize,
    pub stabilizer: StabilizerConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target_fps: 5.0,
            chunk_size: 50,
            max_frames: 0,
            stabilizer: StabilizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAction {
    FirstFrame,
    ChangeDetected,
    Extended,
    Stabilized,
    ExtensionLimit,
    Flushed,
    SaveFailed,
    /// 单帧解码失败，已跳过
    FrameSkipped,
}

impl From<CaptureKind> for ScanAction {
    fn from(kind: CaptureKind) -> Self {
        match kind {
            CaptureKind::FirstFrame => ScanAction::FirstFrame,
            CaptureKind::Stabilized => ScanAction::Stabilized,
            CaptureKind::ExtensionLimit => ScanAction::ExtensionLimit,
            CaptureKind::Flushed => ScanAction::Flushed,
        }
    }
}

/// 结构化进度记录，由调用方决定如何展示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEvent {
    pub timestamp: f64,
    pub action: ScanAction,
    pub change_time: Option<f64>,
    pub scheduled_time: Option<f64>,
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyframeRecord {
    pub sequence: usize,
    pub timestamp: f64,
    pub change_time: Option<f64>,
    pub frame_index: u64,
    pub action: ScanAction,
    pub width: u32,
    pub height: u32,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub keyframes_saved: usize,
    pub frames_read: u64,
    pub frames_sampled: u64,
    /// 解码失败被跳过的帧数
    pub frames_skipped: u64,
    pub chunks: u64,
    pub save_failures: usize,
    pub cap_reached: bool,
    pub keyframes: Vec<KeyframeRecord>,
    pub events: Vec<ScanEvent>,
}

pub struct KeyframeScanner {
    config: ScanConfig,
}

/// 从来源读到的一项：正常帧或被跳过的坏帧
enum ChunkItem {
    Frame(Frame),
    Skipped(VideoError),
}

#[derive(Default)]
struct ReadState {
    exhausted: bool,
    consecutive_errors: u32,
}

impl KeyframeScanner {
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// 扫描整个来源。单帧落盘失败和单帧解码错误都不会中断扫描；
    /// 返回前总会强制提交剩余的待确认截图
    pub fn scan<S, K>(&self, source: &mut S, sink: &mut K, app_name: &str) -> ScanReport
    where
        S: FrameSource + ?Sized,
        K: KeyframeSink + ?Sized,
    {
        let every = sampling_stride(source.nominal_fps(), self.config.target_fps);
        let chunk_size = self.config.chunk_size.max(1);
        let mut stabilizer = Stabilizer::new(self.config.stabilizer.clone());
        let mut report = ScanReport::default();
        let mut state = ReadState::default();
        let mut last_timestamp = 0.0;

        info!(
            "🎬 Scanning '{}': {:.2} fps source, every {} frame(s), max {} keyframes",
            app_name,
            source.nominal_fps(),
            every,
            self.config.max_frames
        );

        'scan: while !state.exhausted && !self.cap_reached(report.keyframes_saved) {
            let chunk = self.read_chunk(source, chunk_size, &mut state);
            if chunk.is_empty() {
                break;
            }
            report.chunks += 1;

            for item in chunk {
                let frame = match item {
                    ChunkItem::Frame(frame) => frame,
                    ChunkItem::Skipped(e) => {
                        warn!("⚠️ Skipping unreadable frame after {:.2}s: {}", last_timestamp, e);
                        report.frames_skipped += 1;
                        report.events.push(ScanEvent {
                            timestamp: last_timestamp,
                            action: ScanAction::FrameSkipped,
                            change_time: None,
                            scheduled_time: None,
                            distance: None,
                        });
                        continue;
                    }
                };
                report.frames_read += 1;
                last_timestamp = frame.timestamp;

                if frame.index % every != 0 {
                    continue;
                }

                let fingerprint = Fingerprint::of_frame(&frame);
                let budget = self.remaining(report.keyframes_saved);
                let decisions = stabilizer.observe(Arc::new(frame), fingerprint, budget);
                report.frames_sampled += 1;
                self.apply(decisions, sink, app_name, &mut report);

                if self.cap_reached(report.keyframes_saved) {
                    report.cap_reached = true;
                    break 'scan;
                }
            }

            debug!(
                "📦 Processed chunk {}, total keyframes: {}",
                report.chunks, report.keyframes_saved
            );
        }

        let flushed = stabilizer.flush();
        if !flushed.is_empty() {
            info!("🧹 Flushing {} pending capture(s)", flushed.len());
        }
        self.apply(flushed, sink, app_name, &mut report);

        info!(
            "✅ Scan of '{}' complete: {} keyframes from {} sampled frames",
            app_name, report.keyframes_saved, report.frames_sampled
        );
        report
    }

    /// 读取至多 `chunk_size` 项。坏帧原样留在块内，保证事件顺序与分块大小无关
    fn read_chunk<S>(&self, source: &mut S, chunk_size: usize, state: &mut ReadState) -> Vec<ChunkItem>
    where
        S: FrameSource + ?Sized,
    {
        let mut chunk = Vec::with_capacity(chunk_size);
        while chunk.len() < chunk_size {
            match source.next_frame() {
                Ok(Some(frame)) => {
                    state.consecutive_errors = 0;
                    chunk.push(ChunkItem::Frame(frame));
                }
                Ok(None) => {
                    state.exhausted = true;
                    break;
                }
                Err(e) => {
                    state.consecutive_errors += 1;
                    chunk.push(ChunkItem::Skipped(e));
                    if state.consecutive_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        warn!(
                            "⚠️ {} consecutive decode errors, treating as end of stream",
                            state.consecutive_errors
                        );
                        state.exhausted = true;
                        break;
                    }
                }
            }
        }
        chunk
    }

    fn cap_reached(&self, saved: usize) -> bool {
        self.config.max_frames > 0 && saved >= self.config.max_frames
    }

    fn remaining(&self, saved: usize) -> usize {
        if self.config.max_frames == 0 {
            usize::MAX
        } else {
            self.config.max_frames.saturating_sub(saved)
        }
    }

    fn apply<K>(
        &self,
        decisions: Vec<Decision>,
        sink: &mut K,
        app_name: &str,
        report: &mut ScanReport,
    ) where
        K: KeyframeSink + ?Sized,
    {
        for decision in decisions {
            match decision {
                Decision::Commit(capture) => self.commit(capture, sink, app_name, report),
                Decision::ChangeDetected {
                    change_time,
                    scheduled_time,
                    distance,
                } => {
                    info!(
                        "🔍 Change detected at {:.2}s (distance: {:.3}), will capture at {:.2}s",
                        change_time, distance, scheduled_time
                    );
                    report.events.push(ScanEvent {
                        timestamp: change_time,
                        action: ScanAction::ChangeDetected,
                        change_time: Some(change_time),
                        scheduled_time: Some(scheduled_time),
                        distance: Some(distance),
                    });
                }
                Decision::Extended {
                    now,
                    change_time,
                    scheduled_time,
                    consecutive_distance,
                } => {
                    info!(
                        "⏳ Transition ongoing at {:.2}s (change at {:.2}s), extending to {:.2}s",
                        now, change_time, scheduled_time
                    );
                    report.events.push(ScanEvent {
                        timestamp: now,
                        action: ScanAction::Extended,
                        change_time: Some(change_time),
                        scheduled_time: Some(scheduled_time),
                        distance: Some(consecutive_distance),
                    });
                }
            }
        }
    }

    fn commit<K>(&self, capture: Capture, sink: &mut K, app_name: &str, report: &mut ScanReport)
    where
        K: KeyframeSink + ?Sized,
    {
        let action = ScanAction::from(capture.kind);
        match sink.commit(app_name, capture.timestamp, &capture.frame) {
            Ok(keyframe) => {
                report.keyframes_saved += 1;
                info!(
                    "✅ Saved keyframe #{} at {:.2}s ({:?})",
                    keyframe.sequence, capture.timestamp, action
                );
                report.keyframes.push(KeyframeRecord {
                    sequence: keyframe.sequence,
                    timestamp: capture.timestamp,
                    change_time: capture.change_time,
                    frame_index: capture.frame.index,
                    action,
                    width: keyframe.image.width(),
                    height: keyframe.image.height(),
                    path: keyframe.path,
                });
                report.events.push(ScanEvent {
                    timestamp: capture.timestamp,
                    action,
                    change_time: capture.change_time,
                    scheduled_time: None,
                    distance: None,
                });
            }
            Err(e) => {
                warn!(
                    "⚠️ Failed to save keyframe at {:.2}s, skipping: {}",
                    capture.timestamp, e
                );
                report.save_failures += 1;
                report.events.push(ScanEvent {
                    timestamp: capture.timestamp,
                    action: ScanAction::SaveFailed,
                    change_time: capture.change_time,
                    scheduled_time: None,
                    distance: None,
                });
            }
        }
    }
}

impl Default for KeyframeScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::error::VideoError;
    use crate::core::video::sink::{Keyframe, MemorySink};
    use crate::core::video::source::MemoryFrameSource;

    const RED: [u8; 3] = [220, 20, 20];
    const BLUE: [u8; 3] = [20, 20, 220];
    const GREEN: [u8; 3] = [20, 200, 20];

    fn source(fps: f64, screens: &[([u8; 3], usize)]) -> MemoryFrameSource {
        let mut source = MemoryFrameSource::new(fps);
        for (rgb, count) in screens {
            for _ in 0..*count {
                source.push_solid(16, 12, *rgb);
            }
        }
        source
    }

    fn config(chunk_size: usize, max_frames: usize) -> ScanConfig {
        ScanConfig {
            target_fps: 5.0,
            chunk_size,
            max_frames,
            stabilizer: StabilizerConfig {
                diff_threshold: 0.2,
                transition_delay: 0.4,
                max_extensions: None,
            },
        }
    }

    /// 30fps 源每 6 帧采样一次，即每 0.2s
    fn flow() -> MemoryFrameSource {
        source(30.0, &[(RED, 60), (BLUE, 60), (GREEN, 60)])
    }

    #[test]
    fn test_first_frame_and_transitions() {
        let scanner = KeyframeScanner::with_config(config(50, 0));
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(&mut flow(), &mut sink, "Willow");

        assert_eq!(report.keyframes_saved, 3);
        assert_eq!(report.frames_read, 180);
        assert_eq!(report.frames_sampled, 30);
        assert_eq!(report.keyframes[0].action, ScanAction::FirstFrame);
        assert_eq!(report.keyframes[0].frame_index, 0);
        assert_eq!(report.keyframes[1].action, ScanAction::Stabilized);
        // 蓝屏从第 60 帧（2.0s）开始，0.4s 后在 2.4s 确认
        assert_eq!(report.keyframes[1].frame_index, 72);
        assert!((report.keyframes[1].change_time.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(report.keyframes[2].frame_index, 132);
        assert_eq!(sink.keyframes().len(), 3);
        assert_eq!(report.save_failures, 0);
    }

    #[test]
    fn test_identical_frames_yield_one_keyframe() {
        let scanner = KeyframeScanner::with_config(config(50, 0));
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(&mut source(30.0, &[(RED, 90)]), &mut sink, "App");

        assert_eq!(report.keyframes_saved, 1);
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].action, ScanAction::FirstFrame);
    }

    #[test]
    fn test_chunk_size_does_not_change_results() {
        let scanner_small = KeyframeScanner::with_config(config(1, 0));
        let scanner_large = KeyframeScanner::with_config(config(50, 0));
        let mut sink_small = MemorySink::new(600);
        let mut sink_large = MemorySink::new(600);

        let small = scanner_small.scan(&mut flow(), &mut sink_small, "App");
        let large = scanner_large.scan(&mut flow(), &mut sink_large, "App");

        assert_eq!(small.keyframes, large.keyframes);
        assert_eq!(small.events, large.events);
        assert_ne!(small.chunks, large.chunks);
        let images = |sink: &MemorySink| -> Vec<Vec<u8>> {
            sink.keyframes().iter().map(|k| k.image.as_raw().clone()).collect()
        };
        assert_eq!(images(&sink_small), images(&sink_large));
    }

    #[test]
    fn test_chunking_invariance_with_cap() {
        for chunk_size in [1, 7, 50] {
            let scanner = KeyframeScanner::with_config(config(chunk_size, 2));
            let mut sink = MemorySink::new(600);
            let report = scanner.scan(&mut flow(), &mut sink, "App");

            assert_eq!(report.keyframes_saved, 2, "chunk size {chunk_size}");
            assert_eq!(report.keyframes[1].frame_index, 72);
            assert!(report.cap_reached);
        }
    }

    #[test]
    fn test_cap_stops_scan() {
        let scanner = KeyframeScanner::with_config(config(50, 1));
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(&mut flow(), &mut sink, "App");

        assert_eq!(report.keyframes_saved, 1);
        assert!(report.cap_reached);
        assert_eq!(report.frames_sampled, 1);
    }

    #[test]
    fn test_end_of_stream_flushes_pending_capture() {
        // 蓝屏只出现两帧采样后视频结束，等不到 0.4s 的延迟
        let scanner = KeyframeScanner::with_config(config(50, 0));
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(
            &mut source(30.0, &[(RED, 30), (BLUE, 7)]),
            &mut sink,
            "App",
        );

        assert_eq!(report.keyframes_saved, 2);
        let last = report.keyframes.last().unwrap();
        assert_eq!(last.action, ScanAction::Flushed);
        assert_eq!(last.frame_index, 36);
        assert!((last.change_time.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_source() {
        let scanner = KeyframeScanner::new();
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(&mut MemoryFrameSource::new(30.0), &mut sink, "App");

        assert_eq!(report.keyframes_saved, 0);
        assert_eq!(report.chunks, 0);
        assert!(report.events.is_empty());
    }

    #[test]
    fn test_bad_frame_is_skipped_and_scan_continues() {
        let mut src = source(30.0, &[(RED, 30)]);
        src.push(16, 12, vec![0; 4]);
        for _ in 0..60 {
            src.push_solid(16, 12, BLUE);
        }

        let scanner = KeyframeScanner::with_config(config(50, 0));
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(&mut src, &mut sink, "App");

        assert_eq!(src.remaining(), 0);
        assert_eq!(report.frames_read, 90);
        assert_eq!(report.frames_skipped, 1);
        assert_eq!(report.keyframes_saved, 2);
        // 坏帧占用第 30 帧，蓝屏首次被采样是第 36 帧（1.2s），0.4s 后确认
        assert_eq!(report.keyframes[1].action, ScanAction::Stabilized);
        assert_eq!(report.keyframes[1].frame_index, 48);

        let skipped: Vec<_> = report
            .events
            .iter()
            .filter(|e| e.action == ScanAction::FrameSkipped)
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!((skipped[0].timestamp - 29.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_skipped_frame_events_do_not_depend_on_chunk_size() {
        let build = || {
            let mut src = source(30.0, &[(RED, 20)]);
            src.push(16, 12, vec![1, 2, 3]);
            for _ in 0..40 {
                src.push_solid(16, 12, GREEN);
            }
            src
        };
        let small = KeyframeScanner::with_config(config(1, 0))
            .scan(&mut build(), &mut MemorySink::new(600), "App");
        let large = KeyframeScanner::with_config(config(50, 0))
            .scan(&mut build(), &mut MemorySink::new(600), "App");

        assert_eq!(small.events, large.events);
        assert_eq!(small.keyframes, large.keyframes);
    }

    struct BrokenSource {
        calls: u32,
    }

    impl FrameSource for BrokenSource {
        fn nominal_fps(&self) -> f64 {
            30.0
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
            self.calls += 1;
            Err(VideoError::Decode("corrupt packet".to_string()))
        }
    }

    #[test]
    fn test_persistent_decode_errors_end_stream() {
        let mut src = BrokenSource { calls: 0 };
        let scanner = KeyframeScanner::with_config(config(5, 0));
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(&mut src, &mut sink, "App");

        assert_eq!(src.calls, MAX_CONSECUTIVE_READ_ERRORS);
        assert_eq!(report.frames_skipped, MAX_CONSECUTIVE_READ_ERRORS as u64);
        assert_eq!(report.frames_read, 0);
        assert_eq!(report.keyframes_saved, 0);
    }

    #[test]
    fn test_cap_with_open_capture_flushes_past_cap() {
        // 蓝屏只持续一个采样，确认时刻（2.4s）画面已切到绿色：
        // 第 2 张关键帧达到上限，绿屏的待确认截图在结束时强制提交
        let scanner = KeyframeScanner::with_config(config(50, 2));
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(
            &mut source(30.0, &[(RED, 60), (BLUE, 6), (GREEN, 60)]),
            &mut sink,
            "App",
        );

        assert!(report.cap_reached);
        assert_eq!(report.keyframes_saved, 3);
        let actions: Vec<_> = report.keyframes.iter().map(|k| (k.frame_index, k.action)).collect();
        assert_eq!(
            actions,
            vec![
                (0, ScanAction::FirstFrame),
                (72, ScanAction::Stabilized),
                (72, ScanAction::Flushed),
            ]
        );
        assert_eq!(sink.keyframes().len(), 3);
    }

    struct FailingSink {
        inner: MemorySink,
        fail_on: usize,
        calls: usize,
    }

    impl KeyframeSink for FailingSink {
        fn commit(
            &mut self,
            app_name: &str,
            timestamp: f64,
            frame: &Frame,
        ) -> Result<Keyframe, VideoError> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err(VideoError::Io(std::io::Error::other("disk full")));
            }
            self.inner.commit(app_name, timestamp, frame)
        }
    }

    #[test]
    fn test_save_failure_is_not_fatal() {
        let scanner = KeyframeScanner::with_config(config(50, 0));
        let mut sink = FailingSink {
            inner: MemorySink::new(600),
            fail_on: 2,
            calls: 0,
        };
        let report = scanner.scan(&mut flow(), &mut sink, "App");

        assert_eq!(report.save_failures, 1);
        assert_eq!(report.keyframes_saved, 2);
        assert!(report
            .events
            .iter()
            .any(|e| e.action == ScanAction::SaveFailed));
        assert_eq!(sink.inner.keyframes().len(), 2);
    }

    #[test]
    fn test_keyframes_are_resized() {
        let mut src = MemoryFrameSource::new(30.0);
        src.push_solid(1200, 600, RED);

        let scanner = KeyframeScanner::new();
        let mut sink = MemorySink::new(600);
        let report = scanner.scan(&mut src, &mut sink, "App");

        assert_eq!(report.keyframes[0].width, 600);
        assert_eq!(report.keyframes[0].height, 300);
    }
}
