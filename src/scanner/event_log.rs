//! 状态变化事件日志

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::hooks::{HookContext, StateHook};
use super::state::{StateChanges, StateSet, VideoState};
use crate::core::error::HookError;
use crate::core::types::Fraction;

/// States that changed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    pub time: Fraction,
    pub states: StateChanges,
}

impl StateData {
    pub fn new(time: Fraction, states: StateChanges) -> Self {
        Self { time, states }
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    records: Vec<StateData>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<StateData>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, time: Fraction, states: StateChanges) {
        self.records.push(StateData::new(time, states));
    }

    pub fn append_eof(&mut self, time: Fraction) {
        self.push(time, StateChanges::from([(VideoState::Eof, true)]));
    }

    pub fn eof_time(&self) -> Option<Fraction> {
        self.records
            .iter()
            .find(|r| r.states.get(&VideoState::Eof) == Some(&true))
            .map(|r| r.time)
    }

    pub fn records(&self) -> &[StateData] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateData> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes conclude states from every record earlier than `time`.
    ///
    /// Returns the number of entries removed.
    pub fn clear_conclude_before(&mut self, time: Fraction) -> usize {
        let mut removed = 0;
        for record in self.records.iter_mut().filter(|r| r.time < time) {
            for state in VideoState::CONCLUDE_STATES {
                if record.states.remove(&state).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }
}

pub type SharedEventLog = Rc<RefCell<EventLog>>;

fn borrow_failed(hook: &'static str) -> HookError {
    HookError {
        hook,
        reason: "event log is already borrowed".to_string(),
    }
}

/// Appends every change batch to the log.
pub struct EventLogHook {
    log: SharedEventLog,
}

impl EventLogHook {
    pub fn new(log: SharedEventLog) -> Self {
        Self { log }
    }
}

impl StateHook for EventLogHook {
    fn name(&self) -> &'static str {
        "event_log"
    }

    fn states(&self) -> StateSet {
        StateSet::ANY
    }

    fn on_change(&mut self, changes: &StateChanges, context: &HookContext) -> Result<(), HookError> {
        let mut log = self.log.try_borrow_mut().map_err(|_| borrow_failed(self.name()))?;
        log.push(context.time(), changes.clone());
        Ok(())
    }
}

/// Drops earlier conclude states once gameplay is detected again.
pub struct ConcludeCorrectionHook {
    log: SharedEventLog,
}

impl ConcludeCorrectionHook {
    pub fn new(log: SharedEventLog) -> Self {
        Self { log }
    }
}

impl StateHook for ConcludeCorrectionHook {
    fn name(&self) -> &'static str {
        "conclude_correction"
    }

    fn states(&self) -> StateSet {
        StateSet::of(&[VideoState::GameplayDetect])
    }

    fn on_change(&mut self, changes: &StateChanges, context: &HookContext) -> Result<(), HookError> {
        if changes.get(&VideoState::GameplayDetect) != Some(&true) {
            return Ok(());
        }
        let mut log = self.log.try_borrow_mut().map_err(|_| borrow_failed(self.name()))?;
        let removed = log.clear_conclude_before(context.time());
        if removed > 0 {
            debug!("Removed {} premature conclude states before {}", removed, context.time());
        }
        Ok(())
    }
}
