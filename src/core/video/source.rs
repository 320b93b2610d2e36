//! Frame sources feeding the scanner.

use std::collections::VecDeque;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use log::{debug, info, warn};
use serde::Deserialize;

use super::frame::Frame;
use crate::core::error::ScanError;
use crate::core::types::Fraction;

/// A forward-only stream of decoded frames.
pub trait FrameSource {
    /// Next frame, `Ok(None)` once the stream is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>, ScanError>;

    /// Number of frames read so far.
    fn position(&self) -> u64;

    /// Current frame rate; sources may report a different value per step.
    fn frame_rate(&self) -> Fraction;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        (**self).read_frame()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn frame_rate(&self) -> Fraction {
        (**self).frame_rate()
    }
}

/// 内存帧源（测试与预解码场景）
pub struct MemorySource {
    frames: VecDeque<Frame>,
    frame_rate: Fraction,
    position: u64,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>, frame_rate: Fraction) -> Self {
        Self {
            frames: frames.into(),
            frame_rate,
            position: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn read_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn frame_rate(&self) -> Fraction {
        self.frame_rate
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
    r_frame_rate: String,
}

/// Stream geometry reported by `ffprobe`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Fraction,
}

pub fn probe_video(path: &Path) -> Result<StreamInfo, ScanError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        return Err(ScanError::Probe {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)?;
    let stream = parsed.streams.into_iter().next().ok_or_else(|| ScanError::Probe {
        path: path.to_path_buf(),
        reason: "no video stream".to_string(),
    })?;

    Ok(StreamInfo {
        width: stream.width,
        height: stream.height,
        frame_rate: parse_frame_rate(&stream.r_frame_rate)?,
    })
}

/// Parses `"60000/1001"` or `"60"` into an exact rate.
pub fn parse_frame_rate(text: &str) -> Result<Fraction, ScanError> {
    let invalid = || ScanError::InvalidFrameRate(text.to_string());
    let (num, den) = match text.split_once('/') {
        Some((n, d)) => (n.trim(), d.trim()),
        None => (text.trim(), "1"),
    };
    let num: i64 = num.parse().map_err(|_| invalid())?;
    let den: i64 = den.parse().map_err(|_| invalid())?;
    match Fraction::try_new(num, den) {
        Some(rate) if rate.is_positive() => Ok(rate),
        _ => Err(invalid()),
    }
}

/// Decodes a video file through an `ffmpeg` child process emitting raw RGB24.
///
/// The child is killed and reaped when the source is dropped.
pub struct FfmpegSource {
    path: PathBuf,
    info: StreamInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    position: u64,
    exhausted: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let info = probe_video(path)?;
        info!(
            "🎬 Opening {:?}: {}x{} @ {}",
            path, info.width, info.height, info.frame_rate
        );

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScanError::Decode("ffmpeg stdout unavailable".to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            info,
            child,
            stdout: BufReader::new(stdout),
            position: 0,
            exhausted: false,
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }
}

impl FrameSource for FfmpegSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, ScanError> {
        if self.exhausted {
            return Ok(None);
        }

        let frame_size = (self.info.width * self.info.height * 3) as usize;
        let mut data = vec![0u8; frame_size];
        match self.stdout.read_exact(&mut data) {
            Ok(()) => {
                self.position += 1;
                Ok(Some(Frame::new(self.info.width, self.info.height, data)))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("End of stream for {:?} after {} frames", self.path, self.position);
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => Err(ScanError::Decode(e.to_string())),
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn frame_rate(&self) -> Fraction {
        self.info.frame_rate
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            if e.kind() != ErrorKind::InvalidInput {
                warn!("Failed to stop decoder for {:?}: {}", self.path, e);
            }
        }
        let _ = self.child.wait();
        info!("🗑️ FfmpegSource: released {:?}", self.path);
    }
}
