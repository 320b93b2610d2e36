//! 状态变化回调

use log::{debug, error};

use super::state::{StateChanges, StateSet, VideoState};
use crate::core::error::HookError;
use crate::core::types::Fraction;

/// Position of the frame whose evaluation produced a change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HookContext {
    pub frame_index: u64,
    pub frame_rate: Fraction,
    pub first_frame: bool,
}

impl Default for HookContext {
    fn default() -> Self {
        Self {
            frame_index: 0,
            frame_rate: Fraction::from_int(30),
            first_frame: true,
        }
    }
}

impl HookContext {
    pub fn new(frame_index: u64, frame_rate: Fraction, first_frame: bool) -> Self {
        Self {
            frame_index,
            frame_rate,
            first_frame,
        }
    }

    pub fn time(&self) -> Fraction {
        Fraction::from_frames(self.frame_index as i64, self.frame_rate)
    }
}

pub trait StateHook {
    fn name(&self) -> &'static str;

    fn states(&self) -> StateSet;

    /// Called with the changed entries that intersect [`StateHook::states`].
    fn on_change(&mut self, changes: &StateChanges, context: &HookContext) -> Result<(), HookError>;
}

/// Hooks in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn StateHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl StateHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn fire(&mut self, changes: &StateChanges, context: &HookContext) {
        for hook in self.hooks.iter_mut() {
            let subscribed = hook.states();
            let relevant: StateChanges = changes
                .iter()
                .filter(|(state, _)| subscribed.contains(**state))
                .map(|(state, value)| (*state, *value))
                .collect();
            if relevant.is_empty() {
                continue;
            }
            if let Err(e) = hook.on_change(&relevant, context) {
                error!("Error detected on hook {}, ignoring: {}", hook.name(), e);
            }
        }
    }
}

/// Closure-backed hook.
pub struct FnHook<F> {
    name: &'static str,
    states: StateSet,
    callback: F,
}

impl<F> FnHook<F>
where
    F: FnMut(&StateChanges, &HookContext) -> Result<(), HookError>,
{
    pub fn new(name: &'static str, states: StateSet, callback: F) -> Self {
        Self {
            name,
            states,
            callback,
        }
    }
}

impl<F> StateHook for FnHook<F>
where
    F: FnMut(&StateChanges, &HookContext) -> Result<(), HookError>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn states(&self) -> StateSet {
        self.states
    }

    fn on_change(&mut self, changes: &StateChanges, context: &HookContext) -> Result<(), HookError> {
        (self.callback)(changes, context)
    }
}

/// Debug log of every state switched on or off.
pub struct StateLoggerHook;

impl StateHook for StateLoggerHook {
    fn name(&self) -> &'static str {
        "state_logger"
    }

    fn states(&self) -> StateSet {
        StateSet::ANY
    }

    fn on_change(&mut self, changes: &StateChanges, context: &HookContext) -> Result<(), HookError> {
        for (label, flag) in [("ON", true), ("OFF", false)] {
            let toggled: Vec<&str> = changes
                .iter()
                .filter(|(_, value)| **value == flag)
                .map(|(state, _)| VideoState::name(*state))
                .collect();
            if toggled.is_empty() {
                continue;
            }
            debug!(
                "@ ({}, {}) | {} {}",
                context.frame_index,
                context.frame_rate,
                label,
                toggled.join(", ")
            );
        }
        Ok(())
    }
}
