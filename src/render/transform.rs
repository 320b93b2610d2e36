//! 合并渲染：输入槽位分配 + filtergraph 构建 + ffmpeg 执行
//!
//! Input slots are laid out as
//! `[background] [file1 segments...] [file2 segments...] [padding to x10] [intro] [images...]`
//! and every filter refers to inputs by slot index.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::graph::{alias_graph, Action, FilterScript, Graph, GraphChain, StreamRef, StreamType};
use super::instruction::{round_ms, RenderInstruction};
use crate::core::error::RenderError;
use crate::core::video::source::probe_video;
use crate::segments::{SegmentMap, SplitBatch, VideoSegment};

pub const CANVAS_WIDTH: u32 = 1600;
pub const CANVAS_HEIGHT: u32 = 900;
pub const OUTPUT_FPS: u32 = 60;
pub const VIDEO_BITRATE: &str = "4M";
pub const FADE_DURATION: f64 = 0.5;
/// Overlay height for raid team images.
pub const OVERLAY_HEIGHT: i32 = 162;
/// Crop window cut from a joint-drill overlay sheet.
pub const JOINT_DRILL_CROP: (u32, u32) = (1392, 135);

/// Fraction of the frame width covered by the blurred header patch.
const BLUR_CROP_WIDTH: f64 = 0.46;
const BLUR_CROP_LEFT: f64 = 0.375;
const BLUR_CROP_HEIGHT: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderPreset {
    /// Team images scaled to the overlay height.
    Raid,
    /// One overlay sheet; file `i` gets the crop window at `crop_top + crop_interval * i`.
    JointDrill { crop_top: i64, crop_interval: i64 },
}

/// What the local ffmpeg can do, detected once per render.
#[derive(Debug, Clone, Default)]
pub struct EncoderCapabilities {
    /// `feedback` filter, ffmpeg 5.1 and later.
    pub feedback_filter: bool,
    /// Frame width per video file.
    pub widths: HashMap<String, u32>,
}

impl EncoderCapabilities {
    pub fn detect(videos: &[String]) -> Self {
        let feedback_filter = match ffmpeg_version() {
            Some(version) => {
                debug!("ffmpeg version {:?}", version);
                version >= (5, 1)
            }
            None => {
                warn!("⚠️ Could not read ffmpeg version, using crop/overlay header blur");
                false
            }
        };

        let mut widths = HashMap::new();
        if feedback_filter {
            for video in videos {
                match probe_video(Path::new(video)) {
                    Ok(info) => {
                        widths.insert(video.clone(), info.width);
                    }
                    Err(e) => warn!("⚠️ Probe failed for {}: {}", video, e),
                }
            }
        }

        Self { feedback_filter, widths }
    }
}

/// `(major, minor)` from `ffmpeg -version`, e.g. `ffmpeg version 6.1.1-3ubuntu5`.
fn ffmpeg_version() -> Option<(u32, u32)> {
    let output = Command::new("ffmpeg").arg("-version").output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_ffmpeg_version(&text)
}

pub fn parse_ffmpeg_version(text: &str) -> Option<(u32, u32)> {
    let word = text.split_whitespace().nth(2)?;
    let number = word.split('-').next()?;
    let mut parts = number.split('.').map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().and_then(Result::ok).unwrap_or(0);
    Some((major, minor))
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Empty,
    Segment { file: String, segment: VideoSegment },
    File(String),
}

/// Input slots and their render instructions for one merge.
#[derive(Debug, Clone)]
pub struct VideoTransform {
    videos: Vec<String>,
    images: Vec<String>,
    intro: Option<String>,
    splits: HashMap<String, SegmentMap>,
    /// Segments present in at least one file, in segment order.
    split_segments: Vec<VideoSegment>,
    slots: Vec<Slot>,
    indices: HashMap<String, usize>,
    renders: Vec<RenderInstruction>,
}

impl VideoTransform {
    pub fn new(videos: &[String], images: &[String], intro: Option<&str>, batch: &SplitBatch) -> Result<Self, RenderError> {
        let mut splits = HashMap::new();
        for video in videos {
            let segments = batch
                .get(video)
                .ok_or_else(|| RenderError::MissingSplits(PathBuf::from(video)))?;
            splits.insert(video.clone(), segments.clone());
        }

        let mut split_segments: Vec<VideoSegment> = splits.values().flat_map(|m| m.keys()).collect();
        split_segments.sort();
        split_segments.dedup();

        let mut transform = Self {
            videos: videos.to_vec(),
            images: images.to_vec(),
            intro: intro.map(str::to_string),
            splits,
            split_segments,
            slots: Vec::new(),
            indices: HashMap::new(),
            renders: Vec::new(),
        };
        transform.allocate_slots();
        transform.assign_indices();
        transform.assign_renders();
        Ok(transform)
    }

    fn allocate_slots(&mut self) {
        let mut slots = vec![Slot::Empty];
        for video in &self.videos {
            let segments = &self.splits[video];
            for segment in &self.split_segments {
                if segments.contains(*segment) {
                    slots.push(Slot::Segment {
                        file: video.clone(),
                        segment: *segment,
                    });
                } else {
                    slots.push(Slot::Empty);
                }
            }
        }
        let padded = slots.len().div_ceil(10) * 10;
        slots.resize(padded, Slot::Empty);

        slots.push(self.intro.clone().map(Slot::File).unwrap_or(Slot::Empty));
        slots.extend(self.images.iter().cloned().map(Slot::File));
        self.slots = slots;
    }

    fn assign_indices(&mut self) {
        let mut indices = HashMap::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let file = match slot {
                Slot::Segment { file, .. } | Slot::File(file) => file,
                Slot::Empty => continue,
            };
            indices.entry(file.clone()).or_insert(i);
        }
        self.indices = indices;
    }

    fn assign_renders(&mut self) {
        self.renders = self
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Slot::Empty if i == 0 => RenderInstruction::black_screen(CANVAS_WIDTH, CANVAS_HEIGHT, OUTPUT_FPS),
                Slot::Empty => RenderInstruction::Ignore,
                Slot::Segment { file, segment } => self.splits[file]
                    .get(*segment)
                    .map(|span| RenderInstruction::Video {
                        file: file.clone(),
                        start: round_ms(span.start.to_f64()),
                        end: round_ms(span.end.to_f64()),
                    })
                    .unwrap_or(RenderInstruction::Ignore),
                Slot::File(file) => RenderInstruction::Static { file: file.clone() },
            })
            .collect();
    }

    pub fn renders(&self) -> &[RenderInstruction] {
        &self.renders
    }

    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn intro(&self) -> Option<&str> {
        self.intro.as_deref()
    }

    /// First slot holding `file`.
    pub fn index_of(&self, file: &str) -> Result<usize, RenderError> {
        self.indices
            .get(file)
            .copied()
            .ok_or_else(|| RenderError::Layout(format!("{} has no input slot", file)))
    }

    /// Slot holding `segment` of `file`.
    pub fn segment_slot(&self, file: &str, segment: VideoSegment) -> Result<usize, RenderError> {
        let base = self.index_of(file)?;
        let offset = self
            .split_segments
            .iter()
            .position(|s| *s == segment)
            .ok_or_else(|| RenderError::Layout(format!("{} is not allocated", segment)))?;
        Ok(base + offset)
    }

    pub fn segments_of(&self, file: &str) -> Result<&SegmentMap, RenderError> {
        self.splits
            .get(file)
            .ok_or_else(|| RenderError::MissingSplits(PathBuf::from(file)))
    }

    /// Segments after loading that get crossfaded into one clip.
    fn special_segments(&self, file: &str) -> Result<Vec<VideoSegment>, RenderError> {
        let mut special: Vec<VideoSegment> = self
            .segments_of(file)?
            .keys()
            .filter(|s| !matches!(s, VideoSegment::UnitSelection | VideoSegment::LoadingScreen))
            .collect();
        special.sort();
        Ok(special)
    }
}

/// Builds the filtergraph for a [`VideoTransform`] and runs ffmpeg on it.
pub struct FfmpegProcessor<'a> {
    transform: &'a VideoTransform,
    preset: RenderPreset,
    capabilities: EncoderCapabilities,
}

impl<'a> FfmpegProcessor<'a> {
    pub fn new(transform: &'a VideoTransform, preset: RenderPreset, capabilities: EncoderCapabilities) -> Self {
        Self {
            transform,
            preset,
            capabilities,
        }
    }

    pub fn build_script(&self) -> Result<FilterScript, RenderError> {
        let mut script = FilterScript::new();
        self.image_filters(&mut script)?;
        self.combined_segments(&mut script)?;
        self.video_filters(&mut script)?;

        let mut fades = self.aggregate_streams()?;
        self.prepend_intro(&mut script, &mut fades)?;
        for kind in StreamType::ALL {
            if let Some(chain) = fades.remove(&kind) {
                script.push(chain);
            }
        }
        Self::ensure_sink_out(&mut script);
        Ok(script)
    }

    fn image_filters(&self, script: &mut FilterScript) -> Result<(), RenderError> {
        let images = self.transform.images();
        if images.is_empty() {
            return Ok(());
        }
        for i in 0..self.transform.videos().len() {
            let image_index = self.transform.index_of(&images[i % images.len()])?;
            let action = match self.preset {
                RenderPreset::Raid => Action::new("scale").arg(-1).arg(OVERLAY_HEIGHT),
                RenderPreset::JointDrill { crop_top, crop_interval } => Action::new("crop")
                    .arg(JOINT_DRILL_CROP.0)
                    .arg(JOINT_DRILL_CROP.1)
                    .arg("(iw-ow)/2")
                    .arg(crop_top + crop_interval * i as i64),
            };
            script.push(vec![Graph::new(
                vec![StreamRef::input(image_index, StreamType::Video)],
                vec![StreamRef::label(format!("i{}", i + 1))],
                action,
            )]);
        }
        Ok(())
    }

    /// Crossfades gameplay with its conclude/result cuts into `r{v,a}c{n}_splice`.
    fn combined_segments(&self, script: &mut FilterScript) -> Result<(), RenderError> {
        for (i, video) in self.transform.videos().iter().enumerate() {
            let special = self.transform.special_segments(video)?;
            if special.len() <= 1 {
                continue;
            }
            let splits = self.transform.segments_of(video)?;

            let last = special[special.len() - 1];
            let mut chains: BTreeMap<StreamType, GraphChain> = BTreeMap::new();
            for (k, source) in special[..special.len() - 1].iter().enumerate().rev() {
                let mut labels = vec![*source];
                if k == special.len() - 2 {
                    labels.push(last);
                }
                let duration = splits
                    .get(*source)
                    .map(|span| round_ms(span.duration().to_f64()))
                    .unwrap_or_default();

                for kind in StreamType::ALL {
                    let sources = labels
                        .iter()
                        .map(|s| {
                            self.transform
                                .segment_slot(video, *s)
                                .map(|slot| StreamRef::input(slot, kind))
                        })
                        .collect::<Result<Vec<_>, RenderError>>()?;
                    chains
                        .entry(kind)
                        .or_default()
                        .push(Graph::new(sources, Vec::new(), fade_action(kind, duration)));
                }
            }

            for (kind, mut chain) in chains {
                if let Some(tail) = chain.last_mut() {
                    tail.targets
                        .push(StreamRef::label(format!("r{}c{}_splice", kind.letter(), i + 1)));
                }
                script.push(chain);
            }
        }
        Ok(())
    }

    fn blur_header(&self, video: &str, input: usize, n: usize) -> GraphChain {
        let blurred = StreamRef::label(format!("rvpp{}_blur", n));
        let source = StreamRef::input(input, StreamType::Video);
        let colorkey = Action::new("colorkey").arg("0x000020").arg(0.9).arg(0);
        let geq = ['r', 'g', 'b']
            .iter()
            .fold(Action::new("geq"), |action, c| {
                action.param(c.to_string(), format!(r"if(lt(alpha(X\,Y)\,16)\, {c}(W/2\,0)\, {c}(X\,Y))"))
            })
            .param("a", 255);

        match self.capabilities.widths.get(video) {
            Some(width) if self.capabilities.feedback_filter => {
                let feedback = StreamRef::label(format!("fvp{}_1", n));
                let width = f64::from(*width);
                vec![
                    Graph::new(
                        vec![source, feedback.clone()],
                        vec![feedback.clone()],
                        Action::new("feedback@feedback_action")
                            .arg((width * BLUR_CROP_LEFT) as i64)
                            .arg(0)
                            .arg((width * BLUR_CROP_WIDTH) as i64)
                            .arg(BLUR_CROP_HEIGHT),
                    ),
                    Graph::new(Vec::new(), vec![feedback.clone()], colorkey),
                    Graph::new(vec![feedback], vec![blurred], geq),
                ]
            }
            _ => vec![
                Graph::new(
                    vec![source.clone()],
                    Vec::new(),
                    Action::new("crop@feedback_piece_crop")
                        .arg(format!("iw * {}", BLUR_CROP_WIDTH))
                        .arg(BLUR_CROP_HEIGHT)
                        .arg(format!("iw * {}", BLUR_CROP_LEFT))
                        .arg(0),
                ),
                Graph::chained(colorkey),
                Graph::chained(geq),
                Graph::chained(Action::new("setpts").arg("PTS-STARTPTS")),
                Graph::new(
                    vec![source],
                    vec![blurred],
                    Action::new("overlay@feedback_piece_overlay")
                        .arg(format!("W * {}", BLUR_CROP_LEFT))
                        .arg(0),
                ),
            ],
        }
    }

    fn video_filters(&self, script: &mut FilterScript) -> Result<(), RenderError> {
        let has_overlay = !self.transform.images().is_empty();

        for (i, video) in self.transform.videos().iter().enumerate() {
            let n = i + 1;
            let video_index = self.transform.index_of(video)?;
            let special = self.transform.special_segments(video)?;

            let mut sources: Vec<StreamRef> = (0..3)
                .flat_map(|k| StreamType::ALL.map(|kind| StreamRef::input(video_index + k, kind)))
                .collect();
            if special.len() > 1 {
                sources[4] = StreamRef::label(format!("rvc{}_splice", n));
                sources[5] = StreamRef::label(format!("rac{}_splice", n));
            }

            script.push(self.blur_header(video, video_index, n));
            sources[0] = StreamRef::label(format!("rvpp{}_blur", n));

            script.push(vec![Graph::new(
                sources,
                StreamType::ALL
                    .iter()
                    .map(|kind| StreamRef::label(format!("r{}p{}_0", kind.letter(), n)))
                    .collect(),
                Action::new("concat").arg(3).arg(1).arg(1),
            )]);

            script.push(vec![
                Graph::new(
                    vec![StreamRef::label(format!("rvp{}_0", n))],
                    Vec::new(),
                    Action::new("scale").arg(CANVAS_WIDTH).arg(-1),
                ),
                Graph::chained(Action::new("setpts").arg("PTS-STARTPTS")),
                Graph::new(
                    vec![StreamRef::input(0, StreamType::Video)],
                    vec![StreamRef::label(format!("rvp{}_1", n))],
                    Action::new("overlay")
                        .param("x", "(W-w)/2")
                        .param("y", "H-h")
                        .param("eof_action", "endall")
                        .param("shortest", 1),
                ),
            ]);

            if has_overlay {
                script.push(vec![Graph::new(
                    vec![
                        StreamRef::label(format!("rvp{}_1", n)),
                        StreamRef::label(format!("i{}", n)),
                    ],
                    vec![StreamRef::label(format!("rvp{}_2", n))],
                    Action::new("overlay").param("x", "(W-w)/2").param("y", 0),
                )]);
            } else {
                script.push(alias_graph(
                    StreamRef::label(format!("rvp{}_1", n)),
                    &format!("rvp{}_2", n),
                    StreamType::Video,
                ));
            }
        }
        Ok(())
    }

    /// Crossfades consecutive files, last pair first.
    fn aggregate_streams(&self) -> Result<BTreeMap<StreamType, GraphChain>, RenderError> {
        let videos = self.transform.videos();
        let count = videos.len();
        let mut fades: BTreeMap<StreamType, GraphChain> = BTreeMap::new();

        for source in (1..count).rev() {
            let mut labels = vec![source];
            if source == count - 1 {
                labels.push(count);
            }

            let video = &videos[source - 1];
            let splits = self.transform.segments_of(video)?;
            let special = self.transform.special_segments(video)?;
            let total: f64 = splits.iter().map(|(_, span)| span.duration().to_f64()).sum();
            let duration = round_ms(total) - special.len().saturating_sub(1) as f64 * FADE_DURATION;

            for (kind, edit) in [(StreamType::Video, 2), (StreamType::Audio, 0)] {
                let sources = labels
                    .iter()
                    .map(|k| StreamRef::label(format!("r{}p{}_{}", kind.letter(), k, edit)))
                    .collect();
                fades
                    .entry(kind)
                    .or_default()
                    .push(Graph::new(sources, Vec::new(), fade_action(kind, duration)));
            }
        }
        Ok(fades)
    }

    fn prepend_intro(&self, script: &mut FilterScript, fades: &mut BTreeMap<StreamType, GraphChain>) -> Result<(), RenderError> {
        let Some(intro) = self.transform.intro() else {
            for kind in StreamType::ALL {
                if let Some(tail) = fades.get_mut(&kind).and_then(|chain| chain.last_mut()) {
                    tail.targets.push(kind.sink());
                }
            }
            return Ok(());
        };

        let intro_index = self.transform.index_of(intro)?;
        script.push(vec![Graph::new(
            vec![StreamRef::input(intro_index, StreamType::Video)],
            vec![StreamRef::label("rvpi_0")],
            Action::new("scale").arg(CANVAS_WIDTH).arg(-1),
        )]);
        fades.entry(StreamType::Video).or_default().push(Graph::new(
            vec![StreamRef::label("rvpi_0")],
            vec![StreamType::Video.sink()],
            Action::new("concat").arg(2).arg(1).arg(0),
        ));
        fades.entry(StreamType::Audio).or_default().push(Graph::new(
            vec![StreamRef::input(intro_index, StreamType::Audio)],
            vec![StreamType::Audio.sink()],
            Action::new("concat").arg(2).arg(0).arg(1),
        ));
        Ok(())
    }

    /// Aliases the last per-file stream to `vout` / `aout` when nothing feeds them.
    fn ensure_sink_out(script: &mut FilterScript) {
        for kind in StreamType::ALL {
            if script.has_target(&kind.sink()) {
                continue;
            }
            let prefix = format!("r{}p", kind.letter());
            let last = script
                .graphs()
                .flat_map(|g| g.targets.iter())
                .filter(|t| t.label_name().is_some_and(|name| name.starts_with(&prefix)))
                .last()
                .cloned();
            if let Some(label) = last {
                let sink = kind.sink();
                let sink_name = sink.label_name().unwrap_or_default().to_string();
                script.push(alias_graph(label, &sink_name, kind));
            }
        }
    }

    /// Full ffmpeg argument list, without the program name.
    pub fn encoder_args(&self, script_path: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-stats", "-hide_banner", "-loglevel", "24"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for render in self.transform.renders() {
            args.extend(render.input_args());
        }
        args.push("-filter_complex_script".to_string());
        args.push(script_path.display().to_string());
        args.extend(
            ["-r", &OUTPUT_FPS.to_string(), "-b:v", VIDEO_BITRATE]
                .iter()
                .map(|s| s.to_string()),
        );
        args.extend(["-map", "[vout]", "-map", "[aout]"].iter().map(|s| s.to_string()));
        args.push(output.display().to_string());
        args
    }

    /// Writes the filter script to a temporary file and runs ffmpeg to completion.
    pub fn execute(&self, output: &Path) -> Result<(), RenderError> {
        let script = self.build_script()?;

        let mut file = tempfile::Builder::new()
            .prefix("filter.")
            .suffix(".filter_complex")
            .tempfile()?;
        file.write_all(script.render().as_bytes())?;
        file.flush()?;

        let args = self.encoder_args(file.path(), output);
        debug!("Running ffmpeg with arguments:");
        debug!("{}", args.join(" "));

        info!(
            "🎬 Rendering {} files into {}",
            self.transform.videos().len(),
            output.display()
        );
        let status = Command::new("ffmpeg").args(&args).status()?;
        if !status.success() {
            return Err(RenderError::EncoderFailed(status));
        }
        info!("✅ Render finished: {}", output.display());
        Ok(())
    }
}

fn fade_action(kind: StreamType, duration: f64) -> Action {
    match kind {
        StreamType::Video => Action::new("xfade")
            .arg("fade")
            .arg(FADE_DURATION)
            .arg(duration - FADE_DURATION),
        StreamType::Audio => Action::new("acrossfade").param("d", FADE_DURATION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Fraction, Timespan};

    fn span(start: i64, end: i64) -> Timespan {
        Timespan::new(Fraction::from_int(start), Fraction::from_int(end))
    }

    fn basic(extra: &[(VideoSegment, Timespan)]) -> SegmentMap {
        let mut map: SegmentMap = [
            (VideoSegment::UnitSelection, span(37, 40)),
            (VideoSegment::LoadingScreen, span(45, 46)),
            (VideoSegment::GameplayScreen, span(75, 600)),
        ]
        .into_iter()
        .collect();
        for (segment, s) in extra {
            map.insert(*segment, *s);
        }
        map
    }

    fn batch(files: &[(&str, SegmentMap)]) -> SplitBatch {
        files
            .iter()
            .map(|(name, map)| (name.to_string(), map.clone()))
            .collect()
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_ffmpeg_version() {
        assert_eq!(
            parse_ffmpeg_version("ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023"),
            Some((6, 1))
        );
        assert_eq!(parse_ffmpeg_version("ffmpeg version 5-static"), Some((5, 0)));
        assert_eq!(parse_ffmpeg_version("ffmpeg version n7.0"), None);
    }

    #[test]
    fn test_slot_layout() {
        let videos = strings(&["a.mp4", "b.mp4"]);
        let splits = batch(&[("a.mp4", basic(&[])), ("b.mp4", basic(&[]))]);
        let tf = VideoTransform::new(&videos, &strings(&["t.png", "t.png"]), Some("intro.mp4"), &splits).unwrap();

        let renders = tf.renders();
        // background + 2x3 segments padded to 10, intro, 2 images
        assert_eq!(renders.len(), 13);
        assert_eq!(renders[0], RenderInstruction::black_screen(1600, 900, 60));
        assert_eq!(
            renders[1],
            RenderInstruction::Video {
                file: "a.mp4".to_string(),
                start: 37.0,
                end: 40.0
            }
        );
        assert_eq!(renders[6].file(), Some("b.mp4"));
        assert_eq!(renders[7], RenderInstruction::Ignore);
        assert_eq!(renders[10].file(), Some("intro.mp4"));
        assert_eq!(tf.index_of("b.mp4").unwrap(), 4);
        assert_eq!(tf.index_of("t.png").unwrap(), 11);
        assert_eq!(tf.segment_slot("b.mp4", VideoSegment::GameplayScreen).unwrap(), 6);
    }

    #[test]
    fn test_missing_segment_leaves_gap_slot() {
        let videos = strings(&["a.mp4", "b.mp4"]);
        let splits = batch(&[
            ("a.mp4", basic(&[(VideoSegment::GameplayConclude, span(603, 620))])),
            ("b.mp4", basic(&[])),
        ]);
        let tf = VideoTransform::new(&videos, &[], None, &splits).unwrap();
        let renders = tf.renders();
        assert_eq!(renders[4].file(), Some("a.mp4"));
        assert_eq!(renders[5].file(), Some("b.mp4"));
        assert_eq!(renders[8], RenderInstruction::Ignore);
        // no intro: the slot after padding is ignored
        assert_eq!(renders.len(), 11);
        assert_eq!(renders[10], RenderInstruction::Ignore);
    }

    #[test]
    fn test_missing_splits_is_an_error() {
        let splits = batch(&[("a.mp4", basic(&[]))]);
        let result = VideoTransform::new(&strings(&["a.mp4", "b.mp4"]), &[], None, &splits);
        assert!(matches!(result, Err(RenderError::MissingSplits(_))));
    }

    #[test]
    fn test_single_file_script_aliases_sinks() {
        let videos = strings(&["a.mp4"]);
        let splits = batch(&[("a.mp4", basic(&[]))]);
        let tf = VideoTransform::new(&videos, &[], None, &splits).unwrap();
        let script = FfmpegProcessor::new(&tf, RenderPreset::Raid, EncoderCapabilities::default())
            .build_script()
            .unwrap();
        let text = script.render();

        assert!(text.contains("[1:v]crop@feedback_piece_crop=iw * 0.46:60:iw * 0.375:0"));
        assert!(text.contains("[rvpp1_blur][1:a][2:v][2:a][3:v][3:a]concat=3:1:1[rvp1_0][rap1_0]"));
        assert!(text.contains("[rvp1_1]null[rvp1_2]"));
        assert!(text.contains("[rvp1_2]null[vout]"));
        assert!(text.contains("[rap1_0]anull[aout]"));
        assert!(!text.contains("xfade"));
    }

    #[test]
    fn test_two_files_crossfade_into_sinks() {
        let videos = strings(&["a.mp4", "b.mp4"]);
        let splits = batch(&[("a.mp4", basic(&[])), ("b.mp4", basic(&[]))]);
        let tf = VideoTransform::new(&videos, &strings(&["t.png", "t.png"]), None, &splits).unwrap();
        let script = FfmpegProcessor::new(&tf, RenderPreset::Raid, EncoderCapabilities::default())
            .build_script()
            .unwrap();
        let text = script.render();

        // 3 + 1 + 525 seconds of file a
        assert!(text.contains("[rvp1_2][rvp2_2]xfade=fade:0.5:528.5[vout]"));
        assert!(text.contains("[rap1_0][rap2_0]acrossfade=d=0.5[aout]"));
        assert!(text.contains("[11:v]scale=-1:162[i1]"));
        assert!(text.contains("[rvp2_1][i2]overlay=x=(W-w)/2:y=0[rvp2_2]"));
        assert!(!text.contains("null[vout]"));
    }

    #[test]
    fn test_conclude_segments_are_spliced() {
        let videos = strings(&["a.mp4"]);
        let splits = batch(&[(
            "a.mp4",
            basic(&[
                (VideoSegment::GameplayConclude, span(604, 606)),
                (VideoSegment::GameplayResult, span(610, 650)),
            ]),
        )]);
        let tf = VideoTransform::new(&videos, &[], None, &splits).unwrap();
        let script = FfmpegProcessor::new(&tf, RenderPreset::Raid, EncoderCapabilities::default())
            .build_script()
            .unwrap();
        let text = script.render();

        assert!(text.contains("[4:v][5:v]xfade=fade:0.5:1.5,\n  [3:v]xfade=fade:0.5:524.5[rvc1_splice]"));
        assert!(text.contains("[rvpp1_blur][1:a][2:v][2:a][rvc1_splice][rac1_splice]concat=3:1:1"));
    }

    #[test]
    fn test_joint_drill_crops_overlay_and_feedback_blur() {
        let videos = strings(&["a.mp4", "b.mp4"]);
        let splits = batch(&[("a.mp4", basic(&[])), ("b.mp4", basic(&[]))]);
        let tf = VideoTransform::new(&videos, &strings(&["sheet.png"]), Some("intro.mp4"), &splits).unwrap();
        let capabilities = EncoderCapabilities {
            feedback_filter: true,
            widths: HashMap::from([("a.mp4".to_string(), 1920)]),
        };
        let preset = RenderPreset::JointDrill {
            crop_top: 270,
            crop_interval: 137,
        };
        let processor = FfmpegProcessor::new(&tf, preset, capabilities);
        let text = processor.build_script().unwrap().render();

        assert!(text.contains("[11:v]crop=1392:135:(iw-ow)/2:270[i1]"));
        assert!(text.contains("[11:v]crop=1392:135:(iw-ow)/2:407[i2]"));
        assert!(text.contains("[1:v][fvp1_1]feedback@feedback_action=720:0:883:60[fvp1_1]"));
        // width of b.mp4 unknown
        assert!(text.contains("[4:v]crop@feedback_piece_crop"));
        assert!(text.contains("[10:v]scale=1600:-1[rvpi_0]"));
        assert!(text.contains("[rvpi_0]concat=2:1:0[vout]"));
        assert!(text.contains("[10:a]concat=2:0:1[aout]"));

        let args = processor.encoder_args(Path::new("/tmp/f.filter_complex"), Path::new("out.mp4"));
        assert_eq!(&args[..5], &["-y", "-stats", "-hide_banner", "-loglevel", "24"]);
        assert!(args.windows(2).any(|w| w == ["-filter_complex_script", "/tmp/f.filter_complex"]));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert!(args.windows(2).any(|w| w == ["-b:v", "4M"]));
    }
}
