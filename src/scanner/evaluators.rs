//! 逐帧状态判定
//!
//! Evaluators run in a fixed order every frame and write into the per-frame
//! state vector; the session commits that vector to [`FrameData`] afterwards.

use std::collections::BTreeSet;

use super::config::{marker_names, DetectionTuning};
use super::state::{FrameData, StateVector, VideoState};
use crate::core::marker::MarkerResults;
use crate::core::types::Fraction;
use crate::core::video::frame::{luma, Frame};
use crate::core::video::similarity::calculate_similarity;

/// Fresh detections for one frame plus access to the committed state.
pub struct FrameEvent<'a> {
    states: StateVector,
    frame_data: &'a mut FrameData,
    markers: &'a MarkerResults,
}

impl<'a> FrameEvent<'a> {
    pub fn new(frame_data: &'a mut FrameData, markers: &'a MarkerResults) -> Self {
        Self {
            states: StateVector::unknown(),
            frame_data,
            markers,
        }
    }

    pub fn get(&self, state: VideoState) -> Option<bool> {
        self.states.get(state)
    }

    pub fn set(&mut self, state: VideoState, value: bool) {
        self.states.set(state, value);
    }

    /// This frame's value, or the committed one when not measured yet.
    pub fn effective(&self, state: VideoState) -> bool {
        self.states
            .get(state)
            .unwrap_or_else(|| self.frame_data.get(state))
    }

    pub fn found(&self, marker: &str) -> bool {
        self.markers.get(marker).map(|r| r.found).unwrap_or(false)
    }

    pub fn has_result_for(&self, markers: &[&str]) -> bool {
        markers.iter().any(|m| self.markers.contains_key(*m))
    }

    pub fn states(&self) -> &StateVector {
        &self.states
    }

    pub fn frame_data(&self) -> &FrameData {
        &*self.frame_data
    }

    pub fn frame_data_mut(&mut self) -> &mut FrameData {
        &mut *self.frame_data
    }

    pub fn into_states(self) -> StateVector {
        self.states
    }
}

pub trait FrameEvaluator {
    fn name(&self) -> &'static str;

    /// Markers this evaluator reads; it is skipped when none has a result.
    fn required_markers(&self) -> &'static [&'static str] {
        &[]
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, frame: &Frame);
}

pub struct UnitSelection;

impl FrameEvaluator for UnitSelection {
    fn name(&self) -> &'static str {
        "unit_selection"
    }

    fn required_markers(&self) -> &'static [&'static str] {
        &[marker_names::FORMATION_ICONS]
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, _frame: &Frame) {
        let found = event.found(marker_names::FORMATION_ICONS);
        event.set(VideoState::UnitSelect, found);
    }
}

pub struct LoadingFlag;

impl FrameEvaluator for LoadingFlag {
    fn name(&self) -> &'static str {
        "loading_flag"
    }

    fn required_markers(&self) -> &'static [&'static str] {
        &[marker_names::GLOBAL_LOADING]
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, _frame: &Frame) {
        let found = event.found(marker_names::GLOBAL_LOADING);
        event.set(VideoState::LoadingFlag, found);
    }
}

pub struct LoadingScreen;

impl FrameEvaluator for LoadingScreen {
    fn name(&self) -> &'static str {
        "loading_screen"
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, _frame: &Frame) {
        let loading = event.effective(VideoState::LoadingFlag) && event.effective(VideoState::ScreenDark);
        event.set(VideoState::LoadingScreen, loading);
    }
}

pub struct GameplayScreen;

impl FrameEvaluator for GameplayScreen {
    fn name(&self) -> &'static str {
        "gameplay_screen"
    }

    fn required_markers(&self) -> &'static [&'static str] {
        &[marker_names::BATTLE_ICON_CLOCK, marker_names::BATTLE_ICON_PAUSE]
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, _frame: &Frame) {
        let found = self
            .required_markers()
            .iter()
            .all(|marker| event.found(marker));
        event.set(VideoState::GameplayDetect, found);
    }
}

pub struct GameplayResult;

impl FrameEvaluator for GameplayResult {
    fn name(&self) -> &'static str {
        "gameplay_result"
    }

    fn required_markers(&self) -> &'static [&'static str] {
        &[marker_names::BATTLE_RESULT_VICTORY, marker_names::BATTLE_RESULT_DEFEAT]
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, _frame: &Frame) {
        let victory = event.found(marker_names::BATTLE_RESULT_VICTORY);
        let defeat = event.found(marker_names::BATTLE_RESULT_DEFEAT);
        event.set(VideoState::GameplayConcludeSuccess, victory);
        event.set(VideoState::GameplayConcludeFailure, defeat);
    }
}

/// 黑屏 / 暗屏判定
pub struct BlackScreen {
    inset: u32,
    dark_value: u8,
    dark_ratio: f64,
    black_ratio: f64,
}

impl BlackScreen {
    pub fn new(tuning: &DetectionTuning) -> Self {
        Self {
            inset: tuning.dark_inset,
            dark_value: tuning.dark_value,
            dark_ratio: tuning.dark_ratio,
            black_ratio: tuning.black_ratio,
        }
    }

    /// Percentage of dark pixels inside the inset rectangle.
    pub fn dark_percentage(&self, frame: &Frame) -> f64 {
        let inset = self.inset;
        let area = if frame.width > inset * 2 && frame.height > inset * 2 {
            frame.crop(inset..frame.width - inset, inset..frame.height - inset)
        } else {
            frame.clone()
        };

        let total = area.pixel_count();
        if total == 0 {
            return 0.0;
        }
        let dark = area
            .data
            .chunks_exact(3)
            .filter(|px| luma(px) < self.dark_value)
            .count();
        100.0 * dark as f64 / total as f64
    }
}

impl FrameEvaluator for BlackScreen {
    fn name(&self) -> &'static str {
        "black_screen"
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, frame: &Frame) {
        let ratio = self.dark_percentage(frame);
        let dark = ratio >= self.dark_ratio;
        let black = ratio >= self.black_ratio;

        if event.frame_data().context().first_frame {
            let frame_data = event.frame_data_mut();
            frame_data.seed(VideoState::ScreenDark, dark);
            frame_data.seed(VideoState::ScreenBlack, black);
        }

        event.set(VideoState::ScreenDark, dark);
        event.set(VideoState::ScreenBlack, black);
    }
}

/// 胜利 → 结算画面过渡追踪
pub struct VictoryTransition {
    conclude_wait: Fraction,
    result_delay: Fraction,
    result_similarity: f64,
    last_frame: Option<Frame>,
    decided_at: Option<u64>,
}

impl VictoryTransition {
    pub fn new(tuning: &DetectionTuning) -> Self {
        Self {
            conclude_wait: tuning.conclude_wait,
            result_delay: tuning.result_delay,
            result_similarity: tuning.result_similarity,
            last_frame: None,
            decided_at: None,
        }
    }

    /// Frame index of the latest result decision.
    pub fn decided_at(&self) -> Option<u64> {
        self.decided_at
    }
}

impl FrameEvaluator for VictoryTransition {
    fn name(&self) -> &'static str {
        "victory_transition"
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, frame: &Frame) {
        let context = *event.frame_data().context();
        let n = context.frame_index;
        let fps = context.frame_rate;

        let last = match &self.last_frame {
            Some(last) if !context.first_frame => last,
            _ => {
                self.last_frame = Some(frame.clone());
                return;
            }
        };
        if last == frame {
            return;
        }

        let score = calculate_similarity(last, frame);
        let now = Fraction::from(n as i64);
        let frames_after = |since: u64, seconds: Fraction| Fraction::from(since as i64) + fps * seconds;

        if let Some(since) = event.frame_data().was_active(VideoState::GameplayDetect) {
            event.set(
                VideoState::GameplayConcludeWait,
                now > frames_after(since, self.conclude_wait),
            );
        }

        let latched = event
            .frame_data()
            .last_active(VideoState::GameplayConcludeResult)
            .is_some();
        if !latched {
            if let Some(since) = event.frame_data().was_active(VideoState::GameplayConcludeSuccess) {
                let result = score <= self.result_similarity && now > frames_after(since, self.result_delay);
                event.set(VideoState::GameplayConcludeResult, result);
                self.decided_at = Some(n);
            }
        }

        if event.get(VideoState::GameplayConcludeResult) == Some(true) {
            event.set(VideoState::GameplayConcludeWait, false);
        }

        self.last_frame = Some(frame.clone());
    }
}

/// Records the frame index of every state that is true this frame.
pub struct LastActiveTracker;

impl FrameEvaluator for LastActiveTracker {
    fn name(&self) -> &'static str {
        "last_active_tracker"
    }

    fn evaluate(&mut self, event: &mut FrameEvent<'_>, _frame: &Frame) {
        let n = event.frame_data().context().frame_index;
        let active: Vec<VideoState> = event
            .states()
            .iter()
            .filter(|(_, value)| *value)
            .map(|(state, _)| state)
            .collect();
        let frame_data = event.frame_data_mut();
        for state in active {
            frame_data.mark_active(state, n);
        }
    }
}

/// Evaluators in their fixed execution order.
pub struct EvaluatorPipeline {
    evaluators: Vec<Box<dyn FrameEvaluator>>,
}

impl EvaluatorPipeline {
    pub fn new(evaluators: Vec<Box<dyn FrameEvaluator>>) -> Self {
        Self { evaluators }
    }

    pub fn standard(tuning: &DetectionTuning) -> Self {
        Self::new(vec![
            Box::new(UnitSelection),
            Box::new(LoadingFlag),
            Box::new(LoadingScreen),
            Box::new(GameplayScreen),
            Box::new(GameplayResult),
            Box::new(BlackScreen::new(tuning)),
            Box::new(VictoryTransition::new(tuning)),
            Box::new(LastActiveTracker),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.evaluators.iter().map(|e| e.name()).collect()
    }

    /// Union of the markers declared by all evaluators.
    pub fn required_markers(&self) -> BTreeSet<String> {
        self.evaluators
            .iter()
            .flat_map(|e| e.required_markers().iter())
            .map(|m| m.to_string())
            .collect()
    }

    /// Runs every evaluator and returns this frame's states, uncommitted.
    pub fn run(&mut self, frame_data: &mut FrameData, markers: &MarkerResults, frame: &Frame) -> StateVector {
        let mut event = FrameEvent::new(frame_data, markers);
        for evaluator in self.evaluators.iter_mut() {
            let required = evaluator.required_markers();
            if !required.is_empty() && !event.has_result_for(required) {
                continue;
            }
            evaluator.evaluate(&mut event, frame);
        }
        event.into_states()
    }
}
