//! 片段边界解析
//!
//! Turns the sparse state-change log of one file into named segments. Mandatory
//! segments always come out; conclude/result segments only when the log holds
//! a long enough transition for them.

use std::collections::BTreeSet;

use log::{debug, info};

use super::config::ResolverConfig;
use super::{SegmentMap, VideoSegment};
use crate::core::error::SegmentError;
use crate::core::types::{Fraction, Timespan};
use crate::scanner::event_log::EventLog;
use crate::scanner::state::VideoState;

/// Set and unset edges of one log record.
struct Edges {
    time: Fraction,
    set: BTreeSet<VideoState>,
    unset: BTreeSet<VideoState>,
}

impl Edges {
    fn is_set(&self, state: VideoState) -> bool {
        self.set.contains(&state)
    }

    fn is_unset(&self, state: VideoState) -> bool {
        self.unset.contains(&state)
    }
}

pub struct SegmentResolver {
    config: ResolverConfig,
    show_scanned_splits: bool,
}

impl SegmentResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            show_scanned_splits: false,
        }
    }

    pub fn with_diagnostics(mut self, show_scanned_splits: bool) -> Self {
        self.show_scanned_splits = show_scanned_splits;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves the segments of one file.
    ///
    /// Fails when the log carries no EOF record. A log without a recording
    /// cutoff keeps gameplay running until EOF.
    pub fn resolve(&self, name: &str, log: &EventLog) -> Result<SegmentMap, SegmentError> {
        let end = log.eof_time().ok_or(SegmentError::MissingEof)?;
        let edges = Self::collect_edges(log);

        if self.show_scanned_splits {
            debug!("{}", name);
            for e in &edges {
                debug!("{} | ON {:?} | OFF {:?}", e.time, e.set, e.unset);
            }
        }

        let null_span = Timespan::new(Fraction::new(0, end.denominator()), end);
        let mut keys: SegmentMap = VideoSegment::MANDATORY
            .iter()
            .map(|s| (*s, null_span))
            .collect();
        let mut alternate: SegmentMap = VideoSegment::ALL.iter().map(|s| (*s, null_span)).collect();

        self.walk_edges(name, &edges, &mut keys, &mut alternate)?;

        alternate.retain(|_, span| *span != null_span);

        if let Some(probe) = alternate.get_mut(VideoSegment::GameplayScreen) {
            probe.start = probe.end;
            probe.set_duration(self.config.probe_window)?;
        }

        self.trim_conclude_chain(name, &mut alternate)?;

        // gameplay end is only trusted once a conclude stage backs it up
        if alternate.len() > 1 {
            if let (Some(probe), Some(gameplay)) = (
                alternate.get(VideoSegment::GameplayScreen).copied(),
                keys.get_mut(VideoSegment::GameplayScreen),
            ) {
                gameplay.end = probe.end;
            }
        }

        if self.show_scanned_splits {
            debug!("Original");
            for (segment, span) in keys.iter() {
                debug!("{} {} ~ {}", segment, span.start, span.end);
            }
        }

        for (segment, span) in alternate.iter() {
            if !keys.contains(segment) {
                keys.insert(segment, *span);
            }
        }

        if self.show_scanned_splits {
            debug!("Merged");
            for (segment, span) in keys.iter() {
                debug!("{} {} ~ {}", segment, span.start, span.end);
            }
        }

        info!("🎬 {}: {} segments resolved", name, keys.len());
        Ok(keys)
    }

    /// Non-empty records with the EOF flag stripped.
    fn collect_edges(log: &EventLog) -> Vec<Edges> {
        log.iter()
            .filter_map(|record| {
                let mut set = BTreeSet::new();
                let mut unset = BTreeSet::new();
                for (state, value) in &record.states {
                    if *state == VideoState::Eof {
                        continue;
                    }
                    if *value {
                        set.insert(*state);
                    } else {
                        unset.insert(*state);
                    }
                }
                if set.is_empty() && unset.is_empty() {
                    return None;
                }
                Some(Edges {
                    time: record.time,
                    set,
                    unset,
                })
            })
            .collect()
    }

    fn walk_edges(&self, name: &str, edges: &[Edges], keys: &mut SegmentMap, alternate: &mut SegmentMap) -> Result<(), SegmentError> {
        let mut loading_occurrence = 0u32;

        for e in edges {
            let t = e.time;

            if e.is_set(VideoState::UnitSelect) {
                span_mut(name, keys, VideoSegment::UnitSelection)?.start = t;
            } else if e.is_unset(VideoState::UnitSelect) {
                span_mut(name, keys, VideoSegment::UnitSelection)?.end = t;
            }

            if e.is_set(VideoState::LoadingScreen) {
                let offset = if loading_occurrence > 0 {
                    self.config.loading_repeat_offset
                } else {
                    Fraction::zero()
                };
                let loading = span_mut(name, keys, VideoSegment::LoadingScreen)?;
                loading.start = t + offset;
                loading.end = t + self.config.loading_span + offset;
                loading_occurrence += 1;
            } else if e.is_unset(VideoState::LoadingScreen) {
                span_mut(name, keys, VideoSegment::GameplayScreen)?.start = t;
            }

            let loading_end = span_mut(name, keys, VideoSegment::LoadingScreen)?.end;
            let gameplay = span_mut(name, keys, VideoSegment::GameplayScreen)?;
            if e.is_set(VideoState::GameplayDetect) && gameplay.start < loading_end {
                // icons showed up before the loading screen faded out
                gameplay.start = t;
            } else if e.is_unset(VideoState::GameplayDetect) {
                span_mut(name, alternate, VideoSegment::GameplayScreen)?.end = t;
            }

            if e.is_unset(VideoState::GameplayConcludeSuccess) || e.is_unset(VideoState::GameplayConcludeFailure) {
                span_mut(name, alternate, VideoSegment::GameplayConclude)?.start = t - self.config.conclude_lead;
            }

            if e.is_set(VideoState::GameplayConcludeResult) {
                span_mut(name, alternate, VideoSegment::GameplayConclude)?.end = t;
                span_mut(name, alternate, VideoSegment::GameplayResult)?.start = t;
            }

            if e.is_set(VideoState::RecordingCutoff) {
                span_mut(name, keys, VideoSegment::GameplayScreen)?.end = t;
                break;
            }
        }
        Ok(())
    }

    /// Merges short conclude stages away and clamps long ones, walking the
    /// chain from its tail.
    fn trim_conclude_chain(&self, name: &str, alternate: &mut SegmentMap) -> Result<(), SegmentError> {
        let chain: Vec<VideoSegment> = VideoSegment::CONCLUDE_CHAIN
            .iter()
            .copied()
            .filter(|s| alternate.contains(*s))
            .collect();

        for (i, pair) in chain.windows(2).enumerate().rev() {
            let (previous, segment) = (pair[0], pair[1]);
            let Some(bound) = self.config.wait_bounds.get(i).copied() else {
                continue;
            };
            let (Some(prev_span), Some(span)) = (alternate.get(previous).copied(), alternate.get(segment)) else {
                continue;
            };

            let gap = span.start - prev_span.start;
            if gap < bound {
                alternate.remove(segment);
            } else if gap > bound {
                span_mut(name, alternate, previous)?.set_duration(bound)?;
            }
        }
        Ok(())
    }
}

impl Default for SegmentResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

fn span_mut<'a>(file: &str, map: &'a mut SegmentMap, segment: VideoSegment) -> Result<&'a mut Timespan, SegmentError> {
    map.get_mut(segment).ok_or_else(|| SegmentError::MissingSegment {
        file: file.to_string(),
        segment: segment.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::event_log::StateData;
    use crate::scanner::state::StateChanges;

    fn record(log: &mut EventLog, seconds: Fraction, states: &[(VideoState, bool)]) {
        log.push(seconds, states.iter().copied().collect::<StateChanges>());
    }

    fn int(n: i64) -> Fraction {
        Fraction::from_int(n)
    }

    fn span(start: Fraction, end: Fraction) -> Timespan {
        Timespan::new(start, end)
    }

    fn battle_log() -> EventLog {
        let mut log = EventLog::new();
        record(&mut log, int(10), &[(VideoState::UnitSelect, true)]);
        record(&mut log, int(40), &[(VideoState::UnitSelect, false)]);
        record(&mut log, int(45), &[(VideoState::LoadingScreen, true)]);
        record(
            &mut log,
            int(75),
            &[(VideoState::LoadingScreen, false), (VideoState::GameplayDetect, true)],
        );
        record(&mut log, int(600), &[(VideoState::RecordingCutoff, true)]);
        log.append_eof(int(650));
        log
    }

    #[test]
    fn test_resolves_basic_battle() {
        let resolver = SegmentResolver::default();
        let log = battle_log();

        let first = resolver.resolve("a.mp4", &log).unwrap();
        let second = resolver.resolve("a.mp4", &log).unwrap();
        assert_eq!(first, second);

        assert_eq!(first.len(), 3);
        assert_eq!(first.get(VideoSegment::UnitSelection), Some(&span(int(10), int(40))));
        assert_eq!(first.get(VideoSegment::LoadingScreen), Some(&span(int(45), int(46))));
        assert_eq!(first.get(VideoSegment::GameplayScreen), Some(&span(int(75), int(600))));
    }

    #[test]
    fn test_missing_eof_is_an_error() {
        let mut log = EventLog::new();
        record(&mut log, int(10), &[(VideoState::UnitSelect, true)]);
        assert!(matches!(
            SegmentResolver::default().resolve("a.mp4", &log),
            Err(SegmentError::MissingEof)
        ));
    }

    #[test]
    fn test_missing_cutoff_runs_gameplay_to_eof() {
        let mut log = EventLog::new();
        record(&mut log, int(75), &[(VideoState::LoadingScreen, false)]);
        log.append_eof(int(650));
        let map = SegmentResolver::default().resolve("a.mp4", &log).unwrap();
        assert_eq!(map.get(VideoSegment::GameplayScreen), Some(&span(int(75), int(650))));
    }

    #[test]
    fn test_repeated_loading_screen_is_offset() {
        let mut log = EventLog::new();
        record(&mut log, int(45), &[(VideoState::LoadingScreen, true)]);
        record(&mut log, int(50), &[(VideoState::LoadingScreen, false)]);
        record(&mut log, int(52), &[(VideoState::LoadingScreen, true)]);
        log.append_eof(int(100));
        let map = SegmentResolver::default().resolve("a.mp4", &log).unwrap();
        assert_eq!(map.get(VideoSegment::LoadingScreen), Some(&span(int(53), int(54))));
    }

    #[test]
    fn test_early_gameplay_icons_move_gameplay_start() {
        let mut log = EventLog::new();
        record(&mut log, int(45), &[(VideoState::LoadingScreen, true)]);
        record(&mut log, int(50), &[(VideoState::GameplayDetect, true)]);
        log.append_eof(int(100));
        let map = SegmentResolver::default().resolve("a.mp4", &log).unwrap();
        assert_eq!(map.get(VideoSegment::GameplayScreen), Some(&span(int(50), int(100))));
    }

    /// Gameplay icons vanish at 500, the victory banner fades `banner_gap`
    /// seconds later.
    fn conclude_log(banner_gap: Fraction) -> EventLog {
        let mut log = EventLog::new();
        record(&mut log, int(75), &[(VideoState::LoadingScreen, false)]);
        record(&mut log, int(500), &[(VideoState::GameplayDetect, false)]);
        record(&mut log, int(500) + banner_gap, &[(VideoState::GameplayConcludeSuccess, true)]);
        record(
            &mut log,
            int(500) + banner_gap + Fraction::new(75, 60),
            &[(VideoState::GameplayConcludeSuccess, false)],
        );
        record(&mut log, int(620), &[(VideoState::RecordingCutoff, true)]);
        log.append_eof(int(650));
        log
    }

    #[test]
    fn test_short_conclude_is_merged_away() {
        let map = SegmentResolver::default()
            .resolve("a.mp4", &conclude_log(int(2)))
            .unwrap();
        assert!(!map.contains(VideoSegment::GameplayConclude));
        assert_eq!(map.get(VideoSegment::GameplayScreen), Some(&span(int(75), int(620))));
    }

    #[test]
    fn test_long_conclude_clamps_gameplay() {
        let map = SegmentResolver::default()
            .resolve("a.mp4", &conclude_log(int(4)))
            .unwrap();
        assert_eq!(
            map.get(VideoSegment::GameplayScreen),
            Some(&span(int(75), Fraction::new(1005, 2)))
        );
        assert_eq!(
            map.get(VideoSegment::GameplayConclude),
            Some(&span(int(504), int(650)))
        );
        assert_eq!(map.last_key(), Some(VideoSegment::GameplayConclude));
    }

    #[test]
    fn test_exact_bound_keeps_both() {
        let map = SegmentResolver::default()
            .resolve("a.mp4", &conclude_log(Fraction::new(5, 2)))
            .unwrap();
        assert_eq!(
            map.get(VideoSegment::GameplayScreen),
            Some(&span(int(75), int(505)))
        );
        assert!(map.contains(VideoSegment::GameplayConclude));
    }

    #[test]
    fn test_result_stage_follows_conclude() {
        // result screen at 510, before the recording cutoff
        let mut records = conclude_log(int(4)).records().to_vec();
        records.insert(
            4,
            StateData::new(int(510), StateChanges::from([(VideoState::GameplayConcludeResult, true)])),
        );
        let log = EventLog::from_records(records);

        let map = SegmentResolver::default().resolve("a.mp4", &log).unwrap();
        assert_eq!(map.get(VideoSegment::GameplayConclude), Some(&span(int(504), int(506))));
        assert_eq!(map.get(VideoSegment::GameplayResult), Some(&span(int(510), int(650))));
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(
            keys,
            vec![
                VideoSegment::UnitSelection,
                VideoSegment::LoadingScreen,
                VideoSegment::GameplayScreen,
                VideoSegment::GameplayConclude,
                VideoSegment::GameplayResult,
            ]
        );
    }
}
