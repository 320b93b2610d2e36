//! 扫描配置

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::core::marker::{AxisRange, MatchOptions, Region};
use crate::core::types::Fraction;
use crate::core::video::WalkerConfig;

pub mod marker_names {
    pub const FORMATION_ICONS: &str = "formation-icons";
    pub const GLOBAL_LOADING: &str = "global-loading";
    pub const BATTLE_ICON_CLOCK: &str = "battle-icon-clock";
    pub const BATTLE_ICON_PAUSE: &str = "battle-icon-pause";
    pub const BATTLE_RESULT_VICTORY: &str = "battle-result-victory";
    pub const BATTLE_RESULT_DEFEAT: &str = "battle-result-defeat";
}

/// Built-in matching options per marker; other markers use color + AUTO.
pub static MARKER_SETTINGS: Lazy<HashMap<&'static str, MatchOptions>> = Lazy::new(|| {
    use marker_names::*;

    let top_right = Region::new(AxisRange::from_ratio(0.6), AxisRange::until_ratio(0.2));
    let bottom_right = Region::new(AxisRange::from_ratio(0.5), AxisRange::from_ratio(0.8));

    HashMap::from([
        (
            BATTLE_ICON_CLOCK,
            MatchOptions::gray().with_threshold(0.92).with_region(top_right),
        ),
        (
            BATTLE_ICON_PAUSE,
            MatchOptions::gray().with_threshold(0.8).with_region(top_right),
        ),
        (BATTLE_RESULT_VICTORY, MatchOptions::default().with_threshold(0.8)),
        (GLOBAL_LOADING, MatchOptions::gray().with_region(bottom_right)),
    ])
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub similarity_threshold: f64,
    pub skip_history: usize,
    pub similarity_reduce_rate: f64,
    /// Worker threads for template matching, 0 = one per CPU.
    pub threads: usize,
    pub show_skipped_frames: bool,
    pub show_state_changes: bool,
    pub show_marker_detection: bool,
    pub show_scanned_splits: bool,
    /// Per-marker overrides on top of [`MARKER_SETTINGS`].
    pub markers: HashMap<String, MatchOptions>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let walker = WalkerConfig::default();
        Self {
            similarity_threshold: walker.base_threshold,
            skip_history: walker.history_capacity,
            similarity_reduce_rate: walker.reduce_rate,
            threads: 0,
            show_skipped_frames: false,
            show_state_changes: false,
            show_marker_detection: false,
            show_scanned_splits: false,
            markers: HashMap::new(),
        }
    }
}

impl ScanConfig {
    /// All diagnostics switched on.
    pub fn verbose() -> Self {
        Self {
            show_skipped_frames: true,
            show_state_changes: true,
            show_marker_detection: true,
            show_scanned_splits: true,
            ..Self::default()
        }
    }

    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            base_threshold: self.similarity_threshold,
            history_capacity: self.skip_history,
            reduce_rate: self.similarity_reduce_rate,
            show_skipped_frames: self.show_skipped_frames,
        }
    }

    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn marker_settings(&self) -> HashMap<String, MatchOptions> {
        let mut settings: HashMap<String, MatchOptions> = MARKER_SETTINGS
            .iter()
            .map(|(name, options)| (name.to_string(), *options))
            .collect();
        settings.extend(self.markers.iter().map(|(k, v)| (k.clone(), *v)));
        settings
    }
}

/// Constants used by the frame evaluators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionTuning {
    /// Border excluded from the darkness histogram, in pixels.
    pub dark_inset: u32,
    /// Luma below this counts as dark.
    pub dark_value: u8,
    /// Percent of dark pixels for SCREEN_DARK.
    pub dark_ratio: f64,
    /// Percent of dark pixels for SCREEN_BLACK.
    pub black_ratio: f64,
    /// Seconds after gameplay icons vanish before CONCLUDE_WAIT.
    pub conclude_wait: Fraction,
    /// Seconds after victory fades before a result may be decided.
    pub result_delay: Fraction,
    /// Highest frame similarity still treated as a result-screen transition.
    pub result_similarity: f64,
}

impl Default for DetectionTuning {
    fn default() -> Self {
        Self {
            dark_inset: 80,
            dark_value: 5,
            dark_ratio: 70.0,
            black_ratio: 95.0,
            conclude_wait: Fraction::from_int(5),
            result_delay: Fraction::from_int(2),
            result_similarity: 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::Threshold;

    #[test]
    fn test_builtin_marker_settings() {
        let clock = MARKER_SETTINGS[marker_names::BATTLE_ICON_CLOCK];
        assert!(clock.grayscale);
        assert_eq!(clock.threshold, Threshold::Fixed(0.92));
        let (x, y) = clock.region.unwrap().resolve(1600, 900);
        assert_eq!(x, 960..1600);
        assert_eq!(y, 0..180);

        let loading = MARKER_SETTINGS[marker_names::GLOBAL_LOADING];
        assert_eq!(loading.threshold, Threshold::Auto);
        assert_eq!(loading.region.unwrap().resolve(1600, 900), (800..1600, 720..900));

        assert!(!MARKER_SETTINGS.contains_key(marker_names::FORMATION_ICONS));
    }

    #[test]
    fn test_marker_overrides() {
        let mut config = ScanConfig::default();
        config.markers.insert(
            marker_names::BATTLE_RESULT_DEFEAT.to_string(),
            MatchOptions::default().with_threshold(0.9),
        );
        let settings = config.marker_settings();
        assert_eq!(settings.len(), MARKER_SETTINGS.len() + 1);
        assert_eq!(
            settings[marker_names::BATTLE_RESULT_DEFEAT].threshold,
            Threshold::Fixed(0.9)
        );
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"show_state_changes": true, "similarity_threshold": 97.5}"#).unwrap();
        assert!(config.show_state_changes);
        assert_eq!(config.walker_config().base_threshold, 97.5);
        assert_eq!(config.walker_config().history_capacity, 100);

        let tuning: DetectionTuning = serde_json::from_str(r#"{"conclude_wait": [9, 2]}"#).unwrap();
        assert_eq!(tuning.conclude_wait, Fraction::new(9, 2));
        assert_eq!(tuning.dark_inset, 80);
    }

    #[test]
    fn test_effective_threads() {
        let config = ScanConfig {
            threads: 3,
            ..ScanConfig::default()
        };
        assert_eq!(config.effective_threads(), 3);
        assert!(ScanConfig::default().effective_threads() >= 1);
    }
}
