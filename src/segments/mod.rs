//! 事件日志 → 命名视频片段

pub mod config;
pub mod normalize;
pub mod resolver;

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::core::types::Timespan;

pub use config::ResolverConfig;
pub use normalize::{normalize_batch, SplitBatch};
pub use resolver::SegmentResolver;

/// Named segments of one recorded battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VideoSegment {
    UnitSelection,
    LoadingScreen,
    GameplayScreen,
    /// Optional; kept for victory/defeat transitions longer than the first wait bound.
    GameplayConclude,
    /// Optional; kept for result transitions longer than the second wait bound.
    GameplayResult,
}

impl VideoSegment {
    pub const ALL: [VideoSegment; 5] = [
        VideoSegment::UnitSelection,
        VideoSegment::LoadingScreen,
        VideoSegment::GameplayScreen,
        VideoSegment::GameplayConclude,
        VideoSegment::GameplayResult,
    ];

    pub const MANDATORY: [VideoSegment; 3] = [
        VideoSegment::UnitSelection,
        VideoSegment::LoadingScreen,
        VideoSegment::GameplayScreen,
    ];

    /// Segments that may be split off the end of gameplay, in order.
    pub const CONCLUDE_CHAIN: [VideoSegment; 3] = [
        VideoSegment::GameplayScreen,
        VideoSegment::GameplayConclude,
        VideoSegment::GameplayResult,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VideoSegment::UnitSelection => "UNIT_SELECTION",
            VideoSegment::LoadingScreen => "LOADING_SCREEN",
            VideoSegment::GameplayScreen => "GAMEPLAY_SCREEN",
            VideoSegment::GameplayConclude => "GAMEPLAY_CONCLUDE",
            VideoSegment::GameplayResult => "GAMEPLAY_RESULT",
        }
    }

    pub fn is_mandatory(&self) -> bool {
        Self::MANDATORY.contains(self)
    }
}

impl fmt::Display for VideoSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Segment → timespan map that remembers insertion order.
///
/// The last inserted segment is the tail that cross-file normalization rounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentMap {
    entries: Vec<(VideoSegment, Timespan)>,
}

impl SegmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces in place when present, appends otherwise.
    pub fn insert(&mut self, segment: VideoSegment, span: Timespan) {
        match self.get_mut(segment) {
            Some(existing) => *existing = span,
            None => self.entries.push((segment, span)),
        }
    }

    pub fn get(&self, segment: VideoSegment) -> Option<&Timespan> {
        self.entries
            .iter()
            .find(|(s, _)| *s == segment)
            .map(|(_, span)| span)
    }

    pub fn get_mut(&mut self, segment: VideoSegment) -> Option<&mut Timespan> {
        self.entries
            .iter_mut()
            .find(|(s, _)| *s == segment)
            .map(|(_, span)| span)
    }

    pub fn remove(&mut self, segment: VideoSegment) -> Option<Timespan> {
        let index = self.entries.iter().position(|(s, _)| *s == segment)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, segment: VideoSegment) -> bool {
        self.get(segment).is_some()
    }

    pub fn retain<F: FnMut(VideoSegment, &Timespan) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|(s, span)| keep(*s, span));
    }

    pub fn keys(&self) -> impl Iterator<Item = VideoSegment> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VideoSegment, &Timespan)> {
        self.entries.iter().map(|(s, span)| (*s, span))
    }

    pub fn last_key(&self) -> Option<VideoSegment> {
        self.entries.last().map(|(s, _)| *s)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(VideoSegment, Timespan)> for SegmentMap {
    fn from_iter<I: IntoIterator<Item = (VideoSegment, Timespan)>>(iter: I) -> Self {
        let mut map = SegmentMap::new();
        for (segment, span) in iter {
            map.insert(segment, span);
        }
        map
    }
}

impl Serialize for SegmentMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (segment, span) in &self.entries {
            map.serialize_entry(segment.name(), span)?;
        }
        map.end()
    }
}
