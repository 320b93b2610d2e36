use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::core::types::Fraction;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Marker directory not found: {0}")]
    MarkerDirMissing(PathBuf),
    #[error("Probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("segment resolution failed: missing EOF marker")]
    MissingEof,
    #[error("segment resolution failed: {file} has no {segment} segment")]
    MissingSegment { file: String, segment: String },
    #[error("duration must be positive, got {0}")]
    NonPositiveDuration(Fraction),
    #[error("rounding rate must be positive, got {0}")]
    NonPositiveRate(Fraction),
    #[error("{factor} is not a factor of {gcd}")]
    InvalidRatioFactor { factor: i64, gcd: i64 },
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("duplicate files detected on {kind} file list: {file}")]
    DuplicateFile { kind: &'static str, file: PathBuf },
    #[error("expected image files either 1 or {expected}, given {given}")]
    OverlayCountMismatch { expected: usize, given: usize },
    #[error("no video files given")]
    NoVideos,
    #[error("no event log registered for {0}")]
    MissingEventLog(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no split data for {0}")]
    MissingSplits(PathBuf),
    #[error("slot layout error: {0}")]
    Layout(String),
    #[error("encoder exited with {0}")]
    EncoderFailed(ExitStatus),
}

/// Hook 回调失败，只记录日志，不会中断扫描
#[derive(Debug, Error)]
#[error("hook {hook} failed: {reason}")]
pub struct HookError {
    pub hook: &'static str,
    pub reason: String,
}

/// Any failure of a cutoff or merge run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("config error: {0}")]
    Config(String),
}
