//! 合并渲染入口（raid / joint-drill）

use std::path::{Path, PathBuf};

use log::info;

use super::cutoff::CutoffDetector;
use super::reject_duplicates;
use crate::core::error::{InputError, PipelineError};
use crate::render::{EncoderCapabilities, FfmpegProcessor, RenderPreset, VideoTransform};

/// Input files of one merge.
#[derive(Debug, Clone, Default)]
pub struct MergeRequest {
    pub videos: Vec<String>,
    pub overlays: Vec<String>,
    pub intro: Option<String>,
    pub output: PathBuf,
}

impl MergeRequest {
    pub fn new(videos: Vec<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            videos,
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn with_overlays(mut self, overlays: Vec<String>) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn with_intro(mut self, intro: Option<String>) -> Self {
        self.intro = intro;
        self
    }

    /// Overlay sheets used for `preset`, checked before anything is scanned.
    pub fn overlays_for(&self, preset: &RenderPreset) -> Result<Vec<String>, InputError> {
        if self.videos.is_empty() {
            return Err(InputError::NoVideos);
        }
        reject_duplicates("video", &self.videos)?;

        let overlays = match preset {
            RenderPreset::Raid => {
                reject_duplicates("image", &self.overlays)?;
                let given = self.overlays.len();
                if given != 1 && given != self.videos.len() {
                    return Err(InputError::OverlayCountMismatch {
                        expected: self.videos.len(),
                        given,
                    });
                }
                self.overlays
                    .iter()
                    .cycle()
                    .take(self.videos.len())
                    .cloned()
                    .collect()
            }
            // 联合火力演习只用第一张图
            RenderPreset::JointDrill { .. } => self.overlays.iter().take(1).cloned().collect(),
        };

        let files = self.videos.iter().chain(&overlays).chain(self.intro.iter());
        for file in files {
            if !Path::new(file).is_file() {
                return Err(InputError::FileNotFound(PathBuf::from(file)));
            }
        }
        Ok(overlays)
    }

    /// Validates, resolves every video and lays out the input slots.
    pub fn prepare(&self, detector: &CutoffDetector, preset: &RenderPreset) -> Result<VideoTransform, PipelineError> {
        let overlays = self.overlays_for(preset)?;
        let batch = detector.detect(&self.videos)?;
        Ok(VideoTransform::new(
            &self.videos,
            &overlays,
            self.intro.as_deref(),
            &batch,
        )?)
    }
}

fn merge(detector: &CutoffDetector, request: &MergeRequest, preset: RenderPreset) -> Result<(), PipelineError> {
    let transform = request.prepare(detector, &preset)?;
    info!(
        "🎬 Merge: {} videos, {} input slots, preset {:?}",
        transform.videos().len(),
        transform.renders().len(),
        preset
    );
    let capabilities = EncoderCapabilities::detect(transform.videos());
    FfmpegProcessor::new(&transform, preset, capabilities).execute(&request.output)?;
    Ok(())
}

/// 总力战：每个视频配一张队伍图
pub fn raid_merge(detector: &CutoffDetector, request: &MergeRequest) -> Result<(), PipelineError> {
    merge(detector, request, RenderPreset::Raid)
}

/// 联合火力演习：从同一张图上按间隔裁剪
pub fn joint_drill_merge(
    detector: &CutoffDetector,
    request: &MergeRequest,
    crop_top: i64,
    crop_interval: i64,
) -> Result<(), PipelineError> {
    merge(detector, request, RenderPreset::JointDrill { crop_top, crop_interval })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Settings;
    use crate::core::types::Fraction;
    use crate::render::RenderInstruction;
    use crate::scanner::{EventLog, StateChanges, VideoState};
    use std::collections::HashMap;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        File::create(&path).unwrap();
        path.display().to_string()
    }

    fn battle_log() -> EventLog {
        let mut log = EventLog::new();
        let mut record = |seconds: i64, states: &[(VideoState, bool)]| {
            log.push(Fraction::from_int(seconds), states.iter().copied().collect::<StateChanges>());
        };
        record(10, &[(VideoState::UnitSelect, true)]);
        record(40, &[(VideoState::UnitSelect, false)]);
        record(45, &[(VideoState::LoadingScreen, true)]);
        record(
            75,
            &[(VideoState::LoadingScreen, false), (VideoState::GameplayDetect, true)],
        );
        record(600, &[(VideoState::RecordingCutoff, true)]);
        log.append_eof(Fraction::from_int(650));
        log
    }

    fn detector_for(videos: &[String]) -> CutoffDetector {
        let logs: HashMap<String, EventLog> = videos.iter().map(|v| (v.clone(), battle_log())).collect();
        CutoffDetector::from_event_logs(Settings::default(), logs)
    }

    #[test]
    fn test_rejects_empty_video_list() {
        let request = MergeRequest::new(Vec::new(), "out.mp4");
        assert!(matches!(request.overlays_for(&RenderPreset::Raid), Err(InputError::NoVideos)));
    }

    #[test]
    fn test_rejects_duplicate_videos() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.mp4");
        let b = touch(&dir, "b.mp4");
        let request = MergeRequest::new(vec![a.clone(), b, a.clone()], "out.mp4");

        let preset = RenderPreset::JointDrill {
            crop_top: 270,
            crop_interval: 137,
        };
        match request.overlays_for(&preset) {
            Err(InputError::DuplicateFile { kind, file }) => {
                assert_eq!(kind, "video");
                assert_eq!(file, PathBuf::from(a));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_raid_overlay_rules() {
        let dir = TempDir::new().unwrap();
        let videos = vec![touch(&dir, "a.mp4"), touch(&dir, "b.mp4"), touch(&dir, "c.mp4")];
        let team1 = touch(&dir, "team1.png");
        let team2 = touch(&dir, "team2.png");

        let request = MergeRequest::new(videos.clone(), "out.mp4").with_overlays(vec![team1.clone(), team2.clone()]);
        assert!(matches!(
            request.overlays_for(&RenderPreset::Raid),
            Err(InputError::OverlayCountMismatch { expected: 3, given: 2 })
        ));

        let request = MergeRequest::new(videos.clone(), "out.mp4");
        assert!(matches!(
            request.overlays_for(&RenderPreset::Raid),
            Err(InputError::OverlayCountMismatch { expected: 3, given: 0 })
        ));

        let request = MergeRequest::new(videos.clone(), "out.mp4").with_overlays(vec![team1.clone(), team1.clone()]);
        assert!(matches!(
            request.overlays_for(&RenderPreset::Raid),
            Err(InputError::DuplicateFile { kind: "image", .. })
        ));

        let request = MergeRequest::new(videos, "out.mp4").with_overlays(vec![team1.clone()]);
        assert_eq!(
            request.overlays_for(&RenderPreset::Raid).unwrap(),
            vec![team1.clone(), team1.clone(), team1]
        );
    }

    #[test]
    fn test_joint_drill_uses_first_overlay() {
        let dir = TempDir::new().unwrap();
        let videos = vec![touch(&dir, "a.mp4"), touch(&dir, "b.mp4")];
        let sheet = touch(&dir, "sheet.png");
        let preset = RenderPreset::JointDrill {
            crop_top: 270,
            crop_interval: 137,
        };

        let request = MergeRequest::new(videos.clone(), "out.mp4").with_overlays(vec![sheet.clone(), touch(&dir, "x.png")]);
        assert_eq!(request.overlays_for(&preset).unwrap(), vec![sheet]);

        let request = MergeRequest::new(videos, "out.mp4");
        assert!(request.overlays_for(&preset).unwrap().is_empty());
    }

    #[test]
    fn test_missing_files_are_rejected() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.mp4");
        let missing = dir.path().join("intro.mp4").display().to_string();

        let request = MergeRequest::new(vec![a], "out.mp4")
            .with_overlays(vec![touch(&dir, "team.png")])
            .with_intro(Some(missing.clone()));
        match request.overlays_for(&RenderPreset::Raid) {
            Err(InputError::FileNotFound(path)) => assert_eq!(path, PathBuf::from(missing)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_prepare_lays_out_slots() {
        let dir = TempDir::new().unwrap();
        let videos = vec![touch(&dir, "a.mp4"), touch(&dir, "b.mp4")];
        let team = touch(&dir, "team.png");
        let detector = detector_for(&videos);

        let request = MergeRequest::new(videos.clone(), dir.path().join("out.mp4")).with_overlays(vec![team.clone()]);
        let transform = request.prepare(&detector, &RenderPreset::Raid).unwrap();

        // background, 2 x 3 segments, padding, empty intro, two images
        assert_eq!(transform.renders().len(), 13);
        assert_eq!(
            transform.renders()[1],
            RenderInstruction::Video {
                file: videos[0].clone(),
                start: 37.0,
                end: 40.0,
            }
        );
        assert_eq!(transform.renders()[10], RenderInstruction::Ignore);
        assert_eq!(transform.renders()[11], RenderInstruction::Static { file: team.clone() });
        assert_eq!(transform.images(), &[team.clone(), team][..]);
    }
}
