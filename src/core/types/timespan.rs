use serde::{Deserialize, Serialize};

use super::fraction::Fraction;
use crate::core::error::SegmentError;

/// 时间区间 `[start, end]`，单位为秒
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "(Fraction, Fraction)", from = "(Fraction, Fraction)")]
pub struct Timespan {
    pub start: Fraction,
    pub end: Fraction,
}

impl Timespan {
    pub fn new(start: Fraction, end: Fraction) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Fraction {
        self.end - self.start
    }

    /// Moves `end` so that the span lasts exactly `duration`.
    pub fn set_duration(&mut self, duration: Fraction) -> Result<(), SegmentError> {
        if !duration.is_positive() {
            return Err(SegmentError::NonPositiveDuration(duration));
        }
        self.end = self.start + duration;
        Ok(())
    }

    pub fn contains(&self, value: Fraction) -> bool {
        self.start <= value && value <= self.end
    }
}

impl From<Timespan> for (Fraction, Fraction) {
    fn from(span: Timespan) -> Self {
        (span.start, span.end)
    }
}

impl From<(Fraction, Fraction)> for Timespan {
    fn from((start, end): (Fraction, Fraction)) -> Self {
        Self { start, end }
    }
}
