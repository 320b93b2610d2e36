//! 单个视频的扫描会话

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::{error, info};

use super::config::{DetectionTuning, ScanConfig};
use super::evaluators::EvaluatorPipeline;
use super::event_log::{ConcludeCorrectionHook, EventLog, EventLogHook, SharedEventLog};
use super::hooks::{HookContext, StateLoggerHook};
use super::state::FrameData;
use crate::core::error::ScanError;
use crate::core::marker::MarkerDetector;
use crate::core::types::Fraction;
use crate::core::video::{FrameSource, FrameWalker, WalkStep};

/// Scans one source at a time; every call starts from fresh state.
pub struct Scanner {
    detector: Arc<dyn MarkerDetector>,
    config: ScanConfig,
    tuning: DetectionTuning,
}

impl Scanner {
    pub fn new(detector: Arc<dyn MarkerDetector>) -> Self {
        Self::with_config(detector, ScanConfig::default(), DetectionTuning::default())
    }

    pub fn with_config(detector: Arc<dyn MarkerDetector>, config: ScanConfig, tuning: DetectionTuning) -> Self {
        Self {
            detector,
            config,
            tuning,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Walks `source` to the end and returns the state-change log.
    ///
    /// The source is released before this returns, on every path. A decode
    /// failure after the first frame ends the scan early instead of failing it.
    pub fn scan<S: FrameSource>(&self, source: S) -> Result<EventLog, ScanError> {
        let log: SharedEventLog = Rc::new(RefCell::new(EventLog::new()));
        let mut frame_data = FrameData::new();
        {
            let hooks = frame_data.hooks_mut();
            if self.config.show_state_changes {
                hooks.register(StateLoggerHook);
            }
            hooks.register(EventLogHook::new(Rc::clone(&log)));
            hooks.register(ConcludeCorrectionHook::new(Rc::clone(&log)));
        }

        let mut pipeline = EvaluatorPipeline::standard(&self.tuning);
        let relevant = pipeline.required_markers();
        let mut walker = FrameWalker::new(source, self.config.walker_config());

        let mut processed = 0u64;
        let mut last_position: Option<(u64, Fraction)> = None;
        let mut aborted = false;

        for step in walker.by_ref() {
            match step {
                Ok(WalkStep::Frame {
                    frame,
                    frame_index,
                    frame_rate,
                    first,
                }) => {
                    frame_data.set_context(HookContext::new(frame_index, frame_rate, first));
                    let markers = self.detector.detect(&frame, frame_index, &relevant);
                    let states = pipeline.run(&mut frame_data, &markers, &frame);
                    frame_data.update(&states);

                    processed += 1;
                    last_position = Some((frame_index, frame_rate));
                }
                Ok(WalkStep::End {
                    frame_index,
                    frame_rate,
                }) => {
                    last_position = Some((frame_index, frame_rate));
                }
                Err(e) if processed == 0 => return Err(e),
                Err(e) => {
                    error!("❌ Scan aborted after {} frames: {}", processed, e);
                    aborted = true;
                    break;
                }
            }
        }
        if aborted {
            // skipped frames were decoded too
            let source = walker.source();
            last_position = Some((source.position().saturating_sub(1), source.frame_rate()));
        }
        drop(walker);
        drop(frame_data);

        let mut log = Rc::try_unwrap(log)
            .map(RefCell::into_inner)
            .unwrap_or_else(|shared| {
                let log = shared.borrow().clone();
                log
            });
        if let Some((frame_index, frame_rate)) = last_position {
            log.append_eof(Fraction::from_frames(frame_index as i64, frame_rate));
        }

        info!(
            "✅ Scan finished: {} frames evaluated, {} events",
            processed,
            log.len()
        );
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MockMarkerDetector;
    use crate::core::video::{Frame, MemorySource};
    use crate::scanner::config::marker_names;
    use crate::core::types::Timespan;
    use crate::scanner::state::VideoState;
    use crate::segments::{SegmentResolver, VideoSegment};

    /// Alternating content so no frame is skipped.
    fn frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| {
                let v = if i % 2 == 0 { 200 } else { 255 };
                let mut frame = Frame::filled(8, 8, [v, v, v]);
                frame.set_pixel(0, 0, [i as u8, 0, 0]);
                frame
            })
            .collect()
    }

    fn scan(detector: MockMarkerDetector, count: usize) -> EventLog {
        let scanner = Scanner::with_config(
            Arc::new(detector),
            ScanConfig {
                similarity_threshold: 100.5,
                ..ScanConfig::default()
            },
            DetectionTuning::default(),
        );
        scanner
            .scan(MemorySource::new(frames(count), Fraction::from_int(10)))
            .unwrap()
    }

    #[test]
    fn test_scan_logs_edges_and_eof() {
        let detector = MockMarkerDetector::with_pattern(|name, n| {
            name == marker_names::FORMATION_ICONS && (2..5).contains(&n)
        });
        let log = scan(detector, 8);

        let records = log.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].time, Fraction::new(2, 10));
        assert_eq!(records[0].states[&VideoState::UnitSelect], true);
        assert_eq!(records[1].time, Fraction::new(5, 10));
        assert_eq!(records[1].states[&VideoState::UnitSelect], false);
        assert_eq!(log.eof_time(), Some(Fraction::new(7, 10)));
    }

    #[test]
    fn test_scan_without_frames_has_no_eof() {
        let scanner = Scanner::new(Arc::new(MockMarkerDetector::new()));
        let log = scanner
            .scan(MemorySource::new(Vec::new(), Fraction::from_int(60)))
            .unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_rescan_starts_fresh() {
        let scanner = Scanner::with_config(
            Arc::new(MockMarkerDetector::with_fixed_frames(marker_names::GLOBAL_LOADING, vec![1])),
            ScanConfig {
                similarity_threshold: 100.5,
                ..ScanConfig::default()
            },
            DetectionTuning::default(),
        );
        let first = scanner
            .scan(MemorySource::new(frames(4), Fraction::from_int(10)))
            .unwrap();
        let second = scanner
            .scan(MemorySource::new(frames(4), Fraction::from_int(10)))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    struct FailingSource {
        inner: MemorySource,
        fail_at: u64,
    }

    impl FrameSource for FailingSource {
        fn read_frame(&mut self) -> Result<Option<Frame>, ScanError> {
            if self.inner.position() == self.fail_at {
                return Err(ScanError::Decode("corrupt packet".to_string()));
            }
            self.inner.read_frame()
        }

        fn position(&self) -> u64 {
            self.inner.position()
        }

        fn frame_rate(&self) -> Fraction {
            self.inner.frame_rate()
        }
    }

    #[test]
    fn test_decode_failure_mid_scan_still_closes_log() {
        let scanner = Scanner::new(Arc::new(MockMarkerDetector::new()));
        let source = FailingSource {
            inner: MemorySource::new(frames(6), Fraction::from_int(10)),
            fail_at: 3,
        };
        let log = scanner.scan(source).unwrap();
        assert_eq!(log.eof_time(), Some(Fraction::new(2, 10)));
    }

    #[test]
    fn test_decode_failure_after_skipped_frames_keeps_their_time() {
        // identical frames: only frame 0 is evaluated, 1..=4 are skipped
        let still: Vec<Frame> = (0..8).map(|_| Frame::filled(8, 8, [120, 120, 120])).collect();
        let scanner = Scanner::new(Arc::new(MockMarkerDetector::new()));
        let source = FailingSource {
            inner: MemorySource::new(still, Fraction::from_int(10)),
            fail_at: 5,
        };
        let log = scanner.scan(source).unwrap();
        assert_eq!(log.eof_time(), Some(Fraction::new(4, 10)));
    }

    #[test]
    fn test_gameplay_retrigger_drops_early_conclude() {
        let detector = MockMarkerDetector::with_pattern(|name, n| match name {
            marker_names::BATTLE_ICON_CLOCK | marker_names::BATTLE_ICON_PAUSE => {
                (2..=5).contains(&n) || (10..=20).contains(&n)
            }
            marker_names::BATTLE_RESULT_VICTORY => (7..=8).contains(&n) || (23..=24).contains(&n),
            _ => false,
        });
        let scanner = Scanner::with_config(
            Arc::new(detector),
            ScanConfig {
                similarity_threshold: 100.5,
                ..ScanConfig::default()
            },
            DetectionTuning::default(),
        );
        let log = scanner
            .scan(MemorySource::new(frames(40), Fraction::from_int(1)))
            .unwrap();

        let success = VideoState::GameplayConcludeSuccess;
        assert!(log
            .iter()
            .filter(|r| r.time < Fraction::from_int(10))
            .all(|r| !r.states.contains_key(&success)));
        let late: Vec<_> = log
            .iter()
            .filter(|r| r.states.contains_key(&success))
            .map(|r| (r.time, r.states[&success]))
            .collect();
        assert_eq!(
            late,
            vec![(Fraction::from_int(23), true), (Fraction::from_int(25), false)]
        );
        assert_eq!(log.eof_time(), Some(Fraction::from_int(39)));

        let segments = SegmentResolver::default().resolve("a.mp4", &log).unwrap();
        // gameplay is cut 5/2s after the icons vanish, the banner shows 2.75s later
        assert_eq!(
            segments.get(VideoSegment::GameplayScreen),
            Some(&Timespan::new(Fraction::from_int(10), Fraction::new(47, 2)))
        );
        assert_eq!(
            segments.get(VideoSegment::GameplayConclude),
            Some(&Timespan::new(Fraction::new(95, 4), Fraction::from_int(39)))
        );
        assert!(!segments.contains(VideoSegment::GameplayResult));
    }

    #[test]
    fn test_decode_failure_before_first_frame_is_error() {
        let scanner = Scanner::new(Arc::new(MockMarkerDetector::new()));
        let source = FailingSource {
            inner: MemorySource::new(frames(6), Fraction::from_int(10)),
            fail_at: 0,
        };
        assert!(scanner.scan(source).is_err());
    }
}
