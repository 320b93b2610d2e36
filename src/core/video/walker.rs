//! 相似帧自适应跳过的帧遍历器

use log::debug;
use serde::{Deserialize, Serialize};

use super::frame::Frame;
use super::similarity::{calculate_similarity, SkipHistory};
use super::source::FrameSource;
use crate::core::error::ScanError;
use crate::core::types::Fraction;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Similarity (percent) at or above which a frame is skipped.
    pub base_threshold: f64,
    pub history_capacity: usize,
    /// Maximum fraction the threshold may be lowered by during skip bursts.
    pub reduce_rate: f64,
    pub show_skipped_frames: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            base_threshold: 98.0,
            history_capacity: 100,
            reduce_rate: 0.05,
            show_skipped_frames: false,
        }
    }
}

impl WalkerConfig {
    /// Never skips, every decoded frame is yielded.
    pub fn exhaustive() -> Self {
        Self {
            base_threshold: f64::INFINITY,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum WalkStep {
    Frame {
        frame: Frame,
        frame_index: u64,
        frame_rate: Fraction,
        first: bool,
    },
    /// Source exhausted; carries the index of the last decoded frame.
    End { frame_index: u64, frame_rate: Fraction },
}

impl WalkStep {
    pub fn frame_index(&self) -> u64 {
        match self {
            WalkStep::Frame { frame_index, .. } | WalkStep::End { frame_index, .. } => *frame_index,
        }
    }

    pub fn frame_rate(&self) -> Fraction {
        match self {
            WalkStep::Frame { frame_rate, .. } | WalkStep::End { frame_rate, .. } => *frame_rate,
        }
    }

    /// Time of this step in seconds.
    pub fn time(&self) -> Fraction {
        Fraction::from_frames(self.frame_index() as i64, self.frame_rate())
    }
}

/// Forward-only walk over a source that drops near-duplicate frames.
///
/// A frame is compared against the last yielded one; the walk ends with a
/// single [`WalkStep::End`] once at least one frame was yielded.
pub struct FrameWalker<S: FrameSource> {
    source: S,
    config: WalkerConfig,
    history: SkipHistory,
    last_frame: Option<Frame>,
    yielded: u64,
    finished: bool,
}

impl<S: FrameSource> FrameWalker<S> {
    pub fn new(source: S, config: WalkerConfig) -> Self {
        let history = SkipHistory::with_capacity(config.history_capacity);
        Self {
            source,
            config,
            history,
            last_frame: None,
            yielded: 0,
            finished: false,
        }
    }

    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn current_threshold(&self) -> f64 {
        self.history
            .adjusted_threshold(self.config.base_threshold, self.config.reduce_rate)
    }

    fn last_index(&self) -> u64 {
        self.source.position().saturating_sub(1)
    }

    fn advance(&mut self) -> Result<Option<WalkStep>, ScanError> {
        let threshold = self.current_threshold();
        let mut skip_count = 0u32;

        let frame = loop {
            let Some(frame) = self.source.read_frame()? else {
                self.finished = true;
                if self.yielded == 0 {
                    return Ok(None);
                }
                if skip_count > 0 && self.config.show_skipped_frames {
                    debug!("{} frames skipped before end of stream", skip_count);
                }
                return Ok(Some(WalkStep::End {
                    frame_index: self.last_index(),
                    frame_rate: self.source.frame_rate(),
                }));
            };

            match &self.last_frame {
                Some(last) if calculate_similarity(last, &frame) >= threshold => {
                    skip_count += 1;
                }
                _ => break frame,
            }
        };

        let frame_index = self.last_index();
        if skip_count > 0 && self.config.show_skipped_frames {
            debug!(
                "{} frames skipped at {}f (threshold {:.2})",
                skip_count, frame_index, threshold
            );
        }
        self.history.push(skip_count);

        let first = self.yielded == 0;
        self.yielded += 1;
        self.last_frame = Some(frame.clone());

        Ok(Some(WalkStep::Frame {
            frame,
            frame_index,
            frame_rate: self.source.frame_rate(),
            first,
        }))
    }
}

impl<S: FrameSource> Iterator for FrameWalker<S> {
    type Item = Result<WalkStep, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(step) => step.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::source::MemorySource;

    fn source(frames: Vec<Frame>) -> MemorySource {
        MemorySource::new(frames, Fraction::from_int(60))
    }

    #[test]
    fn test_constant_video_yields_first_and_end() {
        let frames = vec![Frame::filled(16, 16, [40, 40, 40]); 30];
        let steps: Vec<WalkStep> = FrameWalker::new(source(frames), WalkerConfig::default())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(steps.len(), 2);
        assert!(matches!(
            steps[0],
            WalkStep::Frame {
                frame_index: 0,
                first: true,
                ..
            }
        ));
        assert!(matches!(steps[1], WalkStep::End { frame_index: 29, .. }));
        assert_eq!(steps[1].time(), Fraction::new(29, 60));
    }

    #[test]
    fn test_changing_frames_are_all_yielded() {
        let frames: Vec<Frame> = (0..6)
            .map(|i| Frame::filled(8, 8, if i % 2 == 0 { [0, 0, 0] } else { [255, 255, 255] }))
            .collect();
        let steps: Vec<WalkStep> = FrameWalker::new(source(frames), WalkerConfig::default())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(steps.len(), 7);
        let indices: Vec<u64> = steps.iter().map(WalkStep::frame_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 5]);
        assert!(matches!(steps[1], WalkStep::Frame { first: false, .. }));
    }

    #[test]
    fn test_skipped_frames_keep_real_index() {
        let mut frames = vec![Frame::filled(8, 8, [0, 0, 0]); 4];
        frames.push(Frame::filled(8, 8, [255, 255, 255]));
        let steps: Vec<WalkStep> = FrameWalker::new(source(frames), WalkerConfig::default())
            .collect::<Result<_, _>>()
            .unwrap();

        let indices: Vec<u64> = steps.iter().map(WalkStep::frame_index).collect();
        assert_eq!(indices, vec![0, 4, 4]);
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        let mut walker = FrameWalker::new(source(Vec::new()), WalkerConfig::default());
        assert!(walker.next().is_none());
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_exhaustive_config_never_skips() {
        let frames = vec![Frame::filled(4, 4, [1, 2, 3]); 5];
        let walker = FrameWalker::new(source(frames), WalkerConfig::exhaustive());
        assert_eq!(walker.count(), 6);
    }
}
