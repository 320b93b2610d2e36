//! 画面状态定义与状态向量

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::hooks::{HookContext, HookRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoState {
    ScreenDark,
    ScreenBlack,
    LoadingFlag,
    /// 编队界面
    UnitSelect,
    LoadingScreen,
    /// 战斗中（时钟与暂停图标）
    GameplayDetect,
    GameplayConcludeWait,
    /// 胜利
    GameplayConcludeSuccess,
    /// 失败
    GameplayConcludeFailure,
    /// 结算画面
    GameplayConcludeResult,
    RecordingCutoff,
    Eof,
}

impl VideoState {
    pub const COUNT: usize = 12;

    pub const ALL: [VideoState; Self::COUNT] = [
        VideoState::ScreenDark,
        VideoState::ScreenBlack,
        VideoState::LoadingFlag,
        VideoState::UnitSelect,
        VideoState::LoadingScreen,
        VideoState::GameplayDetect,
        VideoState::GameplayConcludeWait,
        VideoState::GameplayConcludeSuccess,
        VideoState::GameplayConcludeFailure,
        VideoState::GameplayConcludeResult,
        VideoState::RecordingCutoff,
        VideoState::Eof,
    ];

    pub const CONCLUDE_STATES: [VideoState; 3] = [
        VideoState::GameplayConcludeSuccess,
        VideoState::GameplayConcludeFailure,
        VideoState::GameplayConcludeResult,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            VideoState::ScreenDark => "SCREEN_DARK",
            VideoState::ScreenBlack => "SCREEN_BLACK",
            VideoState::LoadingFlag => "LOADING_FLAG",
            VideoState::UnitSelect => "UNIT_SELECT",
            VideoState::LoadingScreen => "LOADING_SCREEN",
            VideoState::GameplayDetect => "GAMEPLAY_DETECT",
            VideoState::GameplayConcludeWait => "GAMEPLAY_CONCLUDE_WAIT",
            VideoState::GameplayConcludeSuccess => "GAMEPLAY_CONCLUDE_SUCCESS",
            VideoState::GameplayConcludeFailure => "GAMEPLAY_CONCLUDE_FAILURE",
            VideoState::GameplayConcludeResult => "GAMEPLAY_CONCLUDE_RESULT",
            VideoState::RecordingCutoff => "RECORDING_CUTOFF",
            VideoState::Eof => "EOF",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn is_conclude(self) -> bool {
        Self::CONCLUDE_STATES.contains(&self)
    }
}

impl fmt::Display for VideoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Subscription set over [`VideoState`]; `ANY` covers every member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSet(u16);

impl StateSet {
    pub const EMPTY: StateSet = StateSet(0);
    pub const ANY: StateSet = StateSet((1 << VideoState::COUNT) - 1);

    pub fn of(states: &[VideoState]) -> Self {
        states.iter().copied().collect()
    }

    pub fn contains(&self, state: VideoState) -> bool {
        self.0 & (1 << state.index()) != 0
    }

    pub fn insert(&mut self, state: VideoState) {
        self.0 |= 1 << state.index();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<VideoState> for StateSet {
    fn from_iter<I: IntoIterator<Item = VideoState>>(iter: I) -> Self {
        let mut set = StateSet::EMPTY;
        for state in iter {
            set.insert(state);
        }
        set
    }
}

/// Keys whose value actually changed in one update, with their new value.
pub type StateChanges = BTreeMap<VideoState, bool>;

/// Tri-state value per [`VideoState`]: unknown, true or false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateVector {
    values: [Option<bool>; VideoState::COUNT],
}

impl Default for StateVector {
    fn default() -> Self {
        Self::unknown()
    }
}

impl StateVector {
    pub fn unknown() -> Self {
        Self {
            values: [None; VideoState::COUNT],
        }
    }

    pub fn filled(value: bool) -> Self {
        Self {
            values: [Some(value); VideoState::COUNT],
        }
    }

    pub fn get(&self, state: VideoState) -> Option<bool> {
        self.values[state.index()]
    }

    pub fn is_true(&self, state: VideoState) -> bool {
        self.get(state) == Some(true)
    }

    pub fn set(&mut self, state: VideoState, value: impl Into<Option<bool>>) {
        self.values[state.index()] = value.into();
    }

    /// Unknown names are ignored; returns whether the name was recognized.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Option<bool>>) -> bool {
        match VideoState::from_name(name) {
            Some(state) => {
                self.set(state, value);
                true
            }
            None => false,
        }
    }

    /// Entries that hold a value.
    pub fn iter(&self) -> impl Iterator<Item = (VideoState, bool)> + '_ {
        VideoState::ALL
            .into_iter()
            .filter_map(|s| self.get(s).map(|v| (s, v)))
    }

    pub fn is_unset(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Writes every known value of `updates` and returns the entries that changed.
    pub fn apply(&mut self, updates: &StateVector) -> StateChanges {
        let mut changes = StateChanges::new();
        for (state, value) in updates.iter() {
            if self.get(state) != Some(value) {
                self.set(state, value);
                changes.insert(state, value);
            }
        }
        changes
    }
}

/// Persistent per-session state: last known value of every state plus the
/// hooks notified when a value changes.
pub struct FrameData {
    states: StateVector,
    hooks: HookRegistry,
    context: HookContext,
    last_active: [Option<u64>; VideoState::COUNT],
}

impl Default for FrameData {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameData {
    pub fn new() -> Self {
        Self {
            states: StateVector::filled(false),
            hooks: HookRegistry::new(),
            context: HookContext::default(),
            last_active: [None; VideoState::COUNT],
        }
    }

    pub fn states(&self) -> &StateVector {
        &self.states
    }

    pub fn get(&self, state: VideoState) -> bool {
        self.states.is_true(state)
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    pub fn context(&self) -> &HookContext {
        &self.context
    }

    pub fn set_context(&mut self, context: HookContext) {
        self.context = context;
    }

    /// Writes a value without notifying hooks.
    pub fn seed(&mut self, state: VideoState, value: bool) {
        self.states.set(state, value);
    }

    pub fn set(&mut self, state: VideoState, value: bool) -> StateChanges {
        let mut update = StateVector::unknown();
        update.set(state, value);
        self.update(&update)
    }

    /// Commits `updates`; hooks see only the entries that changed.
    pub fn update(&mut self, updates: &StateVector) -> StateChanges {
        let changes = self.states.apply(updates);
        if !changes.is_empty() {
            self.hooks.fire(&changes, &self.context);
        }
        changes
    }

    /// Frame index at which `state` was last observed true.
    pub fn last_active(&self, state: VideoState) -> Option<u64> {
        self.last_active[state.index()]
    }

    pub fn mark_active(&mut self, state: VideoState, frame_index: u64) {
        self.last_active[state.index()] = Some(frame_index);
    }

    /// Seen true before but false now.
    pub fn was_active(&self, state: VideoState) -> Option<u64> {
        match self.last_active(state) {
            Some(n) if !self.get(state) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HookError;
    use crate::scanner::hooks::FnHook;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(
        frame_data: &mut FrameData,
        states: StateSet,
    ) -> Rc<RefCell<Vec<StateChanges>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        frame_data.hooks_mut().register(FnHook::new("recorder", states, move |changes, _| {
            sink.borrow_mut().push(changes.clone());
            Ok(())
        }));
        seen
    }

    #[test]
    fn test_names_round_trip() {
        for state in VideoState::ALL {
            assert_eq!(VideoState::from_name(state.name()), Some(state));
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.name()));
        }
        assert_eq!(VideoState::ALL.len(), VideoState::COUNT);
    }

    #[test]
    fn test_unknown_name_is_noop() {
        let mut vector = StateVector::unknown();
        assert!(!vector.set_by_name("NOT_A_STATE", true));
        assert!(vector.is_unset());

        assert!(vector.set_by_name("UNIT_SELECT", true));
        assert_eq!(vector.get(VideoState::UnitSelect), Some(true));
    }

    #[test]
    fn test_state_set() {
        let set = StateSet::of(&[VideoState::Eof, VideoState::UnitSelect]);
        assert!(set.contains(VideoState::Eof));
        assert!(!set.contains(VideoState::LoadingFlag));
        assert!(VideoState::ALL.iter().all(|s| StateSet::ANY.contains(*s)));
    }

    #[test]
    fn test_apply_returns_only_changes() {
        let mut vector = StateVector::filled(false);
        let mut update = StateVector::unknown();
        update.set(VideoState::UnitSelect, false);
        update.set(VideoState::LoadingFlag, true);

        let changes = vector.apply(&update);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[&VideoState::LoadingFlag], true);
        assert_eq!(vector.get(VideoState::ScreenDark), Some(false));
    }

    #[test]
    fn test_unchanged_batch_fires_no_hooks() {
        let mut frame_data = FrameData::new();
        let seen = recorder(&mut frame_data, StateSet::ANY);

        let mut update = StateVector::unknown();
        for state in [
            VideoState::UnitSelect,
            VideoState::LoadingFlag,
            VideoState::ScreenDark,
            VideoState::ScreenBlack,
            VideoState::GameplayDetect,
        ] {
            update.set(state, false);
        }
        assert!(frame_data.update(&update).is_empty());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_single_change_reaches_subscribers_only() {
        let mut frame_data = FrameData::new();
        let loading = recorder(&mut frame_data, StateSet::of(&[VideoState::LoadingFlag]));
        let gameplay = recorder(&mut frame_data, StateSet::of(&[VideoState::GameplayDetect]));
        let any = recorder(&mut frame_data, StateSet::ANY);

        let mut update = StateVector::unknown();
        update.set(VideoState::UnitSelect, false);
        update.set(VideoState::LoadingFlag, true);
        update.set(VideoState::ScreenDark, false);
        update.set(VideoState::ScreenBlack, false);
        update.set(VideoState::GameplayDetect, false);
        frame_data.update(&update);

        assert_eq!(loading.borrow().len(), 1);
        assert_eq!(loading.borrow()[0].len(), 1);
        assert!(gameplay.borrow().is_empty());
        assert_eq!(any.borrow()[0].keys().copied().collect::<Vec<_>>(), vec![VideoState::LoadingFlag]);
    }

    #[test]
    fn test_failing_hook_does_not_stop_others() {
        let mut frame_data = FrameData::new();
        frame_data.hooks_mut().register(FnHook::new("broken", StateSet::ANY, |_, _| {
            Err(HookError {
                hook: "broken",
                reason: "boom".to_string(),
            })
        }));
        let seen = recorder(&mut frame_data, StateSet::ANY);

        frame_data.set(VideoState::Eof, true);
        assert_eq!(seen.borrow().len(), 1);
        assert!(frame_data.get(VideoState::Eof));
    }

    #[test]
    fn test_seed_is_silent() {
        let mut frame_data = FrameData::new();
        let seen = recorder(&mut frame_data, StateSet::ANY);
        frame_data.seed(VideoState::ScreenDark, true);
        assert!(seen.borrow().is_empty());
        assert!(frame_data.set(VideoState::ScreenDark, true).is_empty());
    }

    #[test]
    fn test_was_active() {
        let mut frame_data = FrameData::new();
        frame_data.mark_active(VideoState::GameplayDetect, 10);
        assert_eq!(frame_data.was_active(VideoState::GameplayDetect), Some(10));

        frame_data.seed(VideoState::GameplayDetect, true);
        assert_eq!(frame_data.was_active(VideoState::GameplayDetect), None);
    }
}
