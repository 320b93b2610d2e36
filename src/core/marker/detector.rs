use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::debug;

use super::matcher::{self, MarkerResult, MatchOptions};
use super::store::MarkerStore;
use crate::core::video::frame::Frame;

pub type MarkerResults = BTreeMap<String, MarkerResult>;

pub trait MarkerDetector: Send + Sync {
    /// Detects the requested markers; markers the detector does not know are
    /// left out of the result map.
    fn detect(&self, frame: &Frame, frame_index: u64, markers: &BTreeSet<String>) -> MarkerResults;
}

/// 基于模板匹配的 marker 检测器
pub struct TemplateDetector {
    store: Arc<MarkerStore>,
    defaults: MatchOptions,
    settings: HashMap<String, MatchOptions>,
    show_marker_detection: bool,
}

impl TemplateDetector {
    pub fn new(store: Arc<MarkerStore>) -> Self {
        Self {
            store,
            defaults: MatchOptions::default(),
            settings: HashMap::new(),
            show_marker_detection: false,
        }
    }

    pub fn with_settings(mut self, settings: HashMap<String, MatchOptions>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_diagnostics(mut self, show_marker_detection: bool) -> Self {
        self.show_marker_detection = show_marker_detection;
        self
    }

    pub fn options_for(&self, marker: &str) -> &MatchOptions {
        self.settings.get(marker).unwrap_or(&self.defaults)
    }
}

impl MarkerDetector for TemplateDetector {
    fn detect(&self, frame: &Frame, frame_index: u64, markers: &BTreeSet<String>) -> MarkerResults {
        let mut results = MarkerResults::new();
        for name in markers {
            let Some(marker) = self.store.get(name) else {
                continue;
            };
            let result = matcher::detect(frame, marker, self.options_for(name));

            if self.show_marker_detection {
                if let Some((lo, hi)) = result.score_range {
                    debug!(
                        "found marker {} at {}f, threshold {:7.3}. {:7.3}~{:7.3}",
                        name,
                        frame_index,
                        result.threshold * 100.0,
                        lo * 100.0,
                        hi * 100.0
                    );
                }
            }
            results.insert(name.clone(), result);
        }
        results
    }
}

type MarkerPattern = Box<dyn Fn(&str, u64) -> bool + Send + Sync>;

pub struct MockMarkerDetector {
    // 模拟在特定帧编号检测到某个 marker
    pattern: Option<MarkerPattern>,
    known: Option<BTreeSet<String>>,
}

impl MockMarkerDetector {
    pub fn new() -> Self {
        Self {
            pattern: None,
            known: None,
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&str, u64) -> bool + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(pattern)),
            known: None,
        }
    }

    /// `marker` is found exactly on the listed frames.
    pub fn with_fixed_frames(marker: &str, frames: Vec<u64>) -> Self {
        let marker = marker.to_string();
        Self::with_pattern(move |name, n| name == marker && frames.contains(&n))
    }

    /// Restrict the markers this detector knows about.
    pub fn only<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known = Some(markers.into_iter().map(Into::into).collect());
        self
    }
}

impl Default for MockMarkerDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerDetector for MockMarkerDetector {
    fn detect(&self, _frame: &Frame, frame_index: u64, markers: &BTreeSet<String>) -> MarkerResults {
        markers
            .iter()
            .filter(|name| self.known.as_ref().map(|k| k.contains(*name)).unwrap_or(true))
            .map(|name| {
                let found = self
                    .pattern
                    .as_ref()
                    .map(|p| p(name, frame_index))
                    .unwrap_or(false);
                let result = if found {
                    MarkerResult::found_at(name.as_str(), vec![(0, 0)])
                } else {
                    MarkerResult::not_found(name.as_str())
                };
                (name.clone(), result)
            })
            .collect()
    }
}
