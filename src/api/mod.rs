//! 命令入口：cutoff 检测与合并渲染

pub mod cutoff;
pub mod merge;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{InputError, PipelineError, ScanError};
use crate::scanner::{DetectionTuning, ScanConfig};
use crate::segments::ResolverConfig;

pub use cutoff::CutoffDetector;
pub use merge::{joint_drill_merge, raid_merge, MergeRequest};

/// Everything loaded from `--config`; missing sections keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanConfig,
    pub tuning: DetectionTuning,
    pub resolver: ResolverConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(ScanError::from)?;
        serde_json::from_str(&text).map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Keeps the first occurrence of each entry.
pub(crate) fn unify_list(files: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(files.len());
    for file in files {
        if !unique.contains(file) {
            unique.push(file.clone());
        }
    }
    unique
}

/// Fails on the first entry repeated in `files`.
pub(crate) fn reject_duplicates(kind: &'static str, files: &[String]) -> Result<(), InputError> {
    let unique = unify_list(files);
    if unique.len() == files.len() {
        return Ok(());
    }
    let duplicate = files
        .iter()
        .enumerate()
        .find(|(i, file)| files[..*i].contains(*file))
        .map(|(_, file)| PathBuf::from(file))
        .unwrap_or_default();
    Err(InputError::DuplicateFile { kind, file: duplicate })
}
