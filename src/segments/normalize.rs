//! 多文件片段统一
//!
//! All files of one batch share the same intro length, and every file's tail
//! is rounded down to whole units counted from gameplay start.

use log::info;
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

use super::config::ResolverConfig;
use super::{SegmentMap, VideoSegment};
use crate::core::error::SegmentError;
use crate::core::types::Fraction;

/// Resolved segments of every file in a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitBatch {
    results: Vec<(String, SegmentMap)>,
}

impl SplitBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: impl Into<String>, segments: SegmentMap) {
        self.results.push((file.into(), segments));
    }

    pub fn get(&self, file: &str) -> Option<&SegmentMap> {
        self.results
            .iter()
            .find(|(name, _)| name == file)
            .map(|(_, segments)| segments)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SegmentMap)> {
        self.results.iter().map(|(name, segments)| (name.as_str(), segments))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl FromIterator<(String, SegmentMap)> for SplitBatch {
    fn from_iter<I: IntoIterator<Item = (String, SegmentMap)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

struct Results<'a>(&'a [(String, SegmentMap)]);

impl Serialize for Results<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (file, segments) in self.0 {
            map.serialize_entry(file, segments)?;
        }
        map.end()
    }
}

impl Serialize for SplitBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut report = serializer.serialize_struct("SplitBatch", 1)?;
        report.serialize_field("results", &Results(&self.results))?;
        report.end()
    }
}

fn floor_to(value: Fraction, rate: Fraction) -> Result<Fraction, SegmentError> {
    let steps = value
        .checked_div(rate)
        .filter(|_| rate.is_positive())
        .ok_or(SegmentError::NonPositiveRate(rate))?;
    Ok(Fraction::from(steps.floor()) * rate)
}

fn missing(file: &str, segment: VideoSegment) -> SegmentError {
    SegmentError::MissingSegment {
        file: file.to_string(),
        segment: segment.name().to_string(),
    }
}

/// Equalizes the intro cutoff and rounds each file's tail.
///
/// Returns the shared cutoff. The cutoff only ever shrinks from
/// `config.intro_cutoff`.
pub fn normalize_batch(batch: &mut SplitBatch, config: &ResolverConfig) -> Result<Fraction, SegmentError> {
    let mut cutoff = config.intro_cutoff;
    for (file, segments) in &batch.results {
        let unit = segments
            .get(VideoSegment::UnitSelection)
            .ok_or_else(|| missing(file, VideoSegment::UnitSelection))?;
        if unit.end < cutoff {
            cutoff = floor_to(unit.end, config.intro_cutoff_rate)?;
        }
    }

    for (file, segments) in batch.results.iter_mut() {
        let gameplay_start = segments
            .get(VideoSegment::GameplayScreen)
            .ok_or_else(|| missing(file, VideoSegment::GameplayScreen))?
            .start;

        if let Some(unit) = segments.get_mut(VideoSegment::UnitSelection) {
            unit.start = unit.end - cutoff;
        }

        let Some(last) = segments.last_key() else {
            continue;
        };
        if let Some(tail) = segments.get_mut(last) {
            tail.end = gameplay_start + floor_to(tail.end - gameplay_start, config.game_cutoff_rate)?;
        }
    }

    info!("🔧 Intro cutoff for {} files: {}s", batch.len(), cutoff);
    Ok(cutoff)
}
