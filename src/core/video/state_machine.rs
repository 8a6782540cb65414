//! 转场检测 / 稳定确认状态机
//!
//! 每个采样帧依次经过：
//! 1. 处理到期的待确认截图（稳定则提交当前帧，否则顺延）
//! 2. 首帧直接提交；其余帧与上次提交的指纹比较，超过阈值则登记待确认截图
//!
//! 两个参考指纹分工不同：`last_committed` 用于发现新的转场，
//! `last_consecutive` 用于判断画面是否已经稳定。

use std::collections::VecDeque;
use std::sync::Arc;

use super::fingerprint::Fingerprint;
use super::frame::Frame;

/// 稳定判定阈值 = diff_threshold × STABILITY_FACTOR
pub const STABILITY_FACTOR: f32 = 0.4;
/// 名义时间戳由浮点运算得到，到期判断留出容差
const TIME_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct StabilizerConfig {
    /// 转场判定阈值，(0, 1)
    pub diff_threshold: f32,
    /// 发现变化后等待多久再截图（秒）
    pub transition_delay: f64,
    /// 顺延次数上限；None 表示不限制
    pub max_extensions: Option<u32>,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            diff_threshold: 0.20,
            transition_delay: 1.0,
            max_extensions: None,
        }
    }
}

impl StabilizerConfig {
    pub fn stability_threshold(&self) -> f32 {
        self.diff_threshold * STABILITY_FACTOR
    }
}

/// 提交原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    FirstFrame,
    Stabilized,
    /// 顺延次数达到上限后强制提交
    ExtensionLimit,
    /// 流结束时强制提交
    Flushed,
}

/// 一次确认后的截图请求，交给 KeyframeSink 落盘
#[derive(Debug, Clone)]
pub struct Capture {
    pub timestamp: f64,
    pub change_time: Option<f64>,
    pub frame: Arc<Frame>,
    pub kind: CaptureKind,
}

/// 状态机每一步产生的决策，按发生顺序排列
#[derive(Debug, Clone)]
pub enum Decision {
    Commit(Capture),
    ChangeDetected {
        change_time: f64,
        scheduled_time: f64,
        distance: f32,
    },
    Extended {
        /// 发生顺延的采样时刻
        now: f64,
        change_time: f64,
        scheduled_time: f64,
        consecutive_distance: f32,
    },
}

/// 已发现转场、等待画面稳定的截图
#[derive(Debug, Clone)]
pub struct PendingCapture {
    pub scheduled_time: f64,
    pub change_time: f64,
    pub candidate: Arc<Frame>,
    pub candidate_fingerprint: Fingerprint,
    pub extensions: u32,
}

/// 单个待确认截图在某一时刻的转移结果
#[derive(Debug)]
pub enum Resolution {
    /// 未到期
    Waiting(PendingCapture),
    /// 画面仍在变化，已顺延
    Extended(PendingCapture, f32),
    /// 可以提交当前帧
    Confirmed {
        change_time: f64,
        kind: CaptureKind,
    },
}

impl PendingCapture {
    pub fn open(frame: Arc<Frame>, fingerprint: Fingerprint, config: &StabilizerConfig) -> Self {
        let change_time = frame.timestamp;
        Self {
            scheduled_time: change_time + config.transition_delay,
            change_time,
            candidate: frame,
            candidate_fingerprint: fingerprint,
            extensions: 0,
        }
    }

    pub fn is_due(&self, now: f64) -> bool {
        now + TIME_EPSILON >= self.scheduled_time
    }

    /// `consecutive_distance` 为当前帧与前一采样帧的距离；
    /// None 表示没有可比较的前一帧
    pub fn resolve(
        mut self,
        frame: &Arc<Frame>,
        fingerprint: &Fingerprint,
        consecutive_distance: Option<f32>,
        config: &StabilizerConfig,
    ) -> Resolution {
        let now = frame.timestamp;
        if !self.is_due(now) {
            return Resolution::Waiting(self);
        }

        let distance = match consecutive_distance {
            None => {
                return Resolution::Confirmed {
                    change_time: self.change_time,
                    kind: CaptureKind::Stabilized,
                }
            }
            Some(d) => d,
        };

        if distance < config.stability_threshold() {
            return Resolution::Confirmed {
                change_time: self.change_time,
                kind: CaptureKind::Stabilized,
            };
        }

        if let Some(limit) = config.max_extensions {
            if self.extensions >= limit {
                return Resolution::Confirmed {
                    change_time: self.change_time,
                    kind: CaptureKind::ExtensionLimit,
                };
            }
        }

        self.scheduled_time = now + config.transition_delay;
        self.candidate = Arc::clone(frame);
        self.candidate_fingerprint = fingerprint.clone();
        self.extensions += 1;
        Resolution::Extended(self, distance)
    }
}

pub struct Stabilizer {
    config: StabilizerConfig,
    last_committed: Option<Fingerprint>,
    last_consecutive: Option<Fingerprint>,
    pending: VecDeque<PendingCapture>,
    last_processed: Option<Arc<Frame>>,
    sample_counter: u64,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            last_committed: None,
            last_consecutive: None,
            pending: VecDeque::new(),
            last_processed: None,
            sample_counter: 0,
        }
    }

    /// 处理一个采样帧。`budget` 为本步最多还能提交的关键帧数量，
    /// 用完后到期的待确认截图保持挂起
    pub fn observe(
        &mut self,
        frame: Arc<Frame>,
        fingerprint: Fingerprint,
        budget: usize,
    ) -> Vec<Decision> {
        self.sample_counter += 1;
        self.last_processed = Some(Arc::clone(&frame));

        let mut decisions = Vec::new();
        let mut committed = 0usize;

        let mut still_pending = VecDeque::with_capacity(self.pending.len());
        while let Some(pending) = self.pending.pop_front() {
            if committed >= budget {
                still_pending.push_back(pending);
                continue;
            }

            let consecutive_distance = self
                .last_consecutive
                .as_ref()
                .map(|prev| prev.distance(&fingerprint));

            match pending.resolve(&frame, &fingerprint, consecutive_distance, &self.config) {
                Resolution::Waiting(p) => still_pending.push_back(p),
                Resolution::Extended(p, consecutive_distance) => {
                    decisions.push(Decision::Extended {
                        now: frame.timestamp,
                        change_time: p.change_time,
                        scheduled_time: p.scheduled_time,
                        consecutive_distance,
                    });
                    still_pending.push_back(p);
                }
                Resolution::Confirmed { change_time, kind } => {
                    decisions.push(Decision::Commit(Capture {
                        timestamp: frame.timestamp,
                        change_time: Some(change_time),
                        frame: Arc::clone(&frame),
                        kind,
                    }));
                    committed += 1;
                    self.last_committed = Some(fingerprint.clone());
                    self.last_consecutive = Some(fingerprint.clone());
                }
            }
        }
        self.pending = still_pending;

        match self.last_committed.as_ref() {
            None => {
                decisions.push(Decision::Commit(Capture {
                    timestamp: frame.timestamp,
                    change_time: None,
                    frame: Arc::clone(&frame),
                    kind: CaptureKind::FirstFrame,
                }));
                self.last_committed = Some(fingerprint.clone());
            }
            Some(reference) => {
                let distance = reference.distance(&fingerprint);
                if distance >= self.config.diff_threshold {
                    let pending =
                        PendingCapture::open(Arc::clone(&frame), fingerprint.clone(), &self.config);
                    decisions.push(Decision::ChangeDetected {
                        change_time: pending.change_time,
                        scheduled_time: pending.scheduled_time,
                        distance,
                    });
                    self.pending.push_back(pending);
                    self.last_committed = Some(fingerprint.clone());
                }
            }
        }
        self.last_consecutive = Some(fingerprint);

        decisions
    }

    /// 流结束：按登记顺序强制提交所有待确认截图。
    /// 优先使用最后处理的帧，从未处理过帧时退回到候选帧
    pub fn flush(&mut self) -> Vec<Decision> {
        let last = self.last_processed.clone();
        self.pending
            .drain(..)
            .map(|pending| {
                let (timestamp, frame) = match &last {
                    Some(frame) => (frame.timestamp, Arc::clone(frame)),
                    None => (pending.scheduled_time, pending.candidate),
                };
                Decision::Commit(Capture {
                    timestamp,
                    change_time: Some(pending.change_time),
                    frame,
                    kind: CaptureKind::Flushed,
                })
            })
            .collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingCapture> {
        self.pending.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_counter
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.last_committed = None;
        self.last_consecutive = None;
        self.pending.clear();
        self.last_processed = None;
        self.sample_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f64 = 5.0;

    fn fp(a: f32, b: f32) -> Fingerprint {
        Fingerprint::from_bins(vec![a, b])
    }

    fn screen_a() -> Fingerprint {
        fp(1.0, 0.0)
    }

    fn screen_b() -> Fingerprint {
        fp(0.0, 1.0)
    }

    fn frame(index: u64) -> Arc<Frame> {
        Arc::new(Frame::solid(4, 4, [index as u8, 0, 0], index, index as f64 / FPS))
    }

    fn commits(decisions: &[Decision]) -> Vec<&Capture> {
        decisions
            .iter()
            .filter_map(|d| match d {
                Decision::Commit(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    fn run(stabilizer: &mut Stabilizer, prints: &[Fingerprint]) -> Vec<Decision> {
        let mut all = Vec::new();
        for (i, p) in prints.iter().enumerate() {
            all.extend(stabilizer.observe(frame(i as u64), p.clone(), usize::MAX));
        }
        all
    }

    fn config(delay: f64) -> StabilizerConfig {
        StabilizerConfig {
            diff_threshold: 0.2,
            transition_delay: delay,
            max_extensions: None,
        }
    }

    #[test]
    fn test_first_frame_always_committed() {
        let mut sm = Stabilizer::new(StabilizerConfig {
            diff_threshold: 0.99,
            ..config(1.0)
        });
        let decisions = sm.observe(frame(0), screen_a(), usize::MAX);

        let c = commits(&decisions);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].kind, CaptureKind::FirstFrame);
        assert_eq!(c[0].timestamp, 0.0);
        assert_eq!(sm.pending_count(), 0);
    }

    #[test]
    fn test_identical_stream_yields_single_commit() {
        let mut sm = Stabilizer::new(config(0.4));
        let prints = vec![screen_a(); 30];
        let all = run(&mut sm, &prints);

        assert_eq!(commits(&all).len(), 1);
        assert!(sm.flush().is_empty());
    }

    #[test]
    fn test_single_clean_transition() {
        let mut sm = Stabilizer::new(config(0.4));
        // t = 0.0 .. 1.4
        let prints = vec![
            screen_a(),
            screen_a(),
            screen_a(),
            screen_b(),
            screen_b(),
            screen_b(),
            screen_b(),
            screen_b(),
        ];
        let all = run(&mut sm, &prints);
        let c = commits(&all);

        assert_eq!(c.len(), 2);
        assert_eq!(c[0].kind, CaptureKind::FirstFrame);
        assert_eq!(c[1].kind, CaptureKind::Stabilized);
        // 变化发生在 0.6s，等待 0.4s 后在 1.0s 确认
        assert_eq!(c[1].change_time, Some(0.6));
        assert!((c[1].timestamp - 1.0).abs() < 1e-9);
        assert_eq!(c[1].frame.index, 5);
        assert!(sm.flush().is_empty());
    }

    #[test]
    fn test_change_detected_schedules_capture() {
        let mut sm = Stabilizer::new(config(1.0));
        sm.observe(frame(0), screen_a(), usize::MAX);
        let decisions = sm.observe(frame(1), screen_b(), usize::MAX);

        assert!(commits(&decisions).is_empty());
        match &decisions[..] {
            [Decision::ChangeDetected {
                change_time,
                scheduled_time,
                distance,
            }] => {
                assert!((change_time - 0.2).abs() < 1e-9);
                assert!((scheduled_time - 1.2).abs() < 1e-9);
                assert!(*distance >= 0.2);
            }
            other => panic!("unexpected decisions: {other:?}"),
        }
        assert_eq!(sm.pending_count(), 1);
    }

    #[test]
    fn test_delay_extension_while_screen_keeps_changing() {
        let mut sm = Stabilizer::new(config(0.2));
        sm.observe(frame(0), screen_a(), usize::MAX);
        sm.observe(frame(1), screen_b(), usize::MAX);
        let before = sm.pending().next().unwrap().scheduled_time;

        // 到期时画面仍在收尾动画中：与前一帧差异超过稳定阈值，但不构成新转场
        let settling = fp(0.05, 1.0);
        let decisions = sm.observe(frame(2), settling.clone(), usize::MAX);
        assert!(commits(&decisions).is_empty());
        match &decisions[..] {
            [Decision::Extended {
                now,
                scheduled_time,
                ..
            }] => {
                assert_eq!(*now, frame(2).timestamp);
                assert_eq!(*scheduled_time, *now + 0.2);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sm.pending_count(), 1);
        let pending = sm.pending().next().unwrap();
        assert!(pending.scheduled_time > before);
        assert_eq!(pending.extensions, 1);

        // 连续两帧相同，画面稳定，提交当前帧
        let decisions = sm.observe(frame(3), settling, usize::MAX);
        let c = commits(&decisions);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].kind, CaptureKind::Stabilized);
        assert_eq!(c[0].change_time, Some(0.2));
        assert_eq!(c[0].frame.index, 3);
        assert_eq!(sm.pending_count(), 0);
    }

    #[test]
    fn test_transition_during_extension_opens_second_capture() {
        let mut sm = Stabilizer::new(config(0.2));
        sm.observe(frame(0), screen_a(), usize::MAX);
        sm.observe(frame(1), screen_b(), usize::MAX);

        let decisions = sm.observe(frame(2), screen_a(), usize::MAX);
        assert!(matches!(
            decisions[..],
            [Decision::Extended { .. }, Decision::ChangeDetected { .. }]
        ));
        assert_eq!(sm.pending_count(), 2);

        let decisions = sm.observe(frame(3), screen_a(), usize::MAX);
        let c = commits(&decisions);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].change_time, Some(0.2));
        assert_eq!(c[1].change_time, Some(0.4));
        assert_eq!(sm.pending_count(), 0);
    }

    #[test]
    fn test_extension_limit_forces_commit() {
        let mut sm = Stabilizer::new(StabilizerConfig {
            max_extensions: Some(2),
            ..config(0.2)
        });
        // 交替画面，永远不稳定
        let prints: Vec<_> = (0..12)
            .map(|i| if i % 2 == 0 { screen_a() } else { screen_b() })
            .collect();
        let all = run(&mut sm, &prints);

        let forced: Vec<_> = commits(&all)
            .into_iter()
            .filter(|c| c.kind == CaptureKind::ExtensionLimit)
            .collect();
        assert!(!forced.is_empty());
        assert!(all.iter().any(|d| matches!(d, Decision::Extended { .. })));
    }

    #[test]
    fn test_unbounded_extension_waits_for_flush() {
        let mut sm = Stabilizer::new(config(0.2));
        let prints: Vec<_> = (0..10)
            .map(|i| if i % 2 == 0 { screen_a() } else { screen_b() })
            .collect();
        let all = run(&mut sm, &prints);

        assert_eq!(commits(&all).len(), 1);
        assert!(sm.pending_count() >= 1);

        let flushed = sm.flush();
        let c = commits(&flushed);
        assert_eq!(c.len(), flushed.len());
        assert!(c.iter().all(|c| c.kind == CaptureKind::Flushed));
        // 使用最后处理的帧
        assert!(c.iter().all(|c| c.frame.index == 9));
        assert_eq!(sm.pending_count(), 0);
    }

    #[test]
    fn test_flush_preserves_creation_order() {
        let mut sm = Stabilizer::new(config(10.0));
        sm.observe(frame(0), screen_a(), usize::MAX);
        sm.observe(frame(1), screen_b(), usize::MAX);
        sm.observe(frame(2), screen_a(), usize::MAX);
        assert_eq!(sm.pending_count(), 2);

        let flushed = sm.flush();
        let c = commits(&flushed);
        assert_eq!(c.len(), 2);
        assert!((c[0].change_time.unwrap() - 0.2).abs() < 1e-9);
        assert!((c[1].change_time.unwrap() - 0.4).abs() < 1e-9);
        assert!(c.iter().all(|c| c.frame.index == 2));
    }

    #[test]
    fn test_budget_keeps_ready_captures_pending() {
        let mut sm = Stabilizer::new(config(0.2));
        sm.observe(frame(0), screen_a(), usize::MAX);
        sm.observe(frame(1), screen_b(), usize::MAX);

        // 到期且画面稳定，但预算为 0
        let decisions = sm.observe(frame(2), screen_b(), 0);
        assert!(commits(&decisions).is_empty());
        assert_eq!(sm.pending_count(), 1);

        let decisions = sm.observe(frame(3), screen_b(), usize::MAX);
        assert_eq!(commits(&decisions).len(), 1);
        assert_eq!(sm.pending_count(), 0);
    }

    #[test]
    fn test_small_drift_is_not_a_transition() {
        let mut sm = Stabilizer::new(config(0.2));
        let prints = vec![fp(1.0, 0.0), fp(1.0, 0.01), fp(1.0, 0.02), fp(1.0, 0.01)];
        let all = run(&mut sm, &prints);

        assert_eq!(commits(&all).len(), 1);
        assert_eq!(sm.pending_count(), 0);
    }

    #[test]
    fn test_reset() {
        let mut sm = Stabilizer::new(config(1.0));
        run(&mut sm, &[screen_a(), screen_b()]);
        assert_eq!(sm.sample_count(), 2);
        assert_eq!(sm.pending_count(), 1);

        sm.reset();
        assert_eq!(sm.sample_count(), 0);
        assert_eq!(sm.pending_count(), 0);
        let c = sm.observe(frame(0), screen_b(), usize::MAX);
        assert_eq!(commits(&c)[0].kind, CaptureKind::FirstFrame);
    }
}
