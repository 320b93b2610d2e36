//! 战斗片段 cutoff 检测
//!
//! ```text
//! battle-cut cutoff-detect a.mp4 b.mp4
//! {"results": {"a.mp4": {"UNIT_SELECTION": [[37, 1], [40, 1]], ...}}}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use super::{reject_duplicates, unify_list, Settings};
use crate::core::error::{InputError, PipelineError, ScanError};
use crate::core::marker::{MarkerDetector, MarkerStore, TemplateDetector};
use crate::core::video::FfmpegSource;
use crate::scanner::{EventLog, Scanner};
use crate::segments::{normalize_batch, SegmentResolver, SplitBatch};

enum LogSource {
    Scan(Scanner),
    /// 预先计算好的事件日志，不扫描视频
    Fixtures(HashMap<String, EventLog>),
}

/// Scans (or looks up) each file's event log and resolves the batch.
pub struct CutoffDetector {
    source: LogSource,
    settings: Settings,
}

impl CutoffDetector {
    /// 加载 marker 目录并创建检测器
    pub fn create(settings: Settings, markers_dir: &Path) -> Result<Self, PipelineError> {
        let store = MarkerStore::load_dir(markers_dir)?;
        info!("🎯 CutoffDetector: {} markers loaded from {}", store.len(), markers_dir.display());

        let detector = TemplateDetector::new(Arc::new(store))
            .with_settings(settings.scan.marker_settings())
            .with_diagnostics(settings.scan.show_marker_detection);
        Ok(Self::with_detector(settings, Arc::new(detector)))
    }

    pub fn with_detector(settings: Settings, detector: Arc<dyn MarkerDetector>) -> Self {
        info!("🎬 CutoffDetector: created");
        let scanner = Scanner::with_config(detector, settings.scan.clone(), settings.tuning.clone());
        Self {
            source: LogSource::Scan(scanner),
            settings,
        }
    }

    /// 使用事件日志 fixture，跳过视频扫描
    pub fn from_event_logs(settings: Settings, logs: HashMap<String, EventLog>) -> Self {
        info!("🎬 CutoffDetector: created with {} event logs", logs.len());
        Self {
            source: LogSource::Fixtures(logs),
            settings,
        }
    }

    /// Reads a `{file: event log}` JSON document.
    pub fn load_event_logs(path: &Path) -> Result<HashMap<String, EventLog>, PipelineError> {
        let text = fs::read_to_string(path).map_err(ScanError::from)?;
        Ok(serde_json::from_str(&text).map_err(ScanError::from)?)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Resolves and normalizes every file; repeated files are resolved once.
    pub fn detect(&self, files: &[String]) -> Result<SplitBatch, PipelineError> {
        let files = unify_list(files);
        let logs = self.event_logs(&files)?;

        let resolver = SegmentResolver::new(self.settings.resolver.clone())
            .with_diagnostics(self.settings.scan.show_scanned_splits);
        let mut batch = SplitBatch::new();
        for (file, log) in files.iter().zip(&logs) {
            batch.push(file.clone(), resolver.resolve(file, log)?);
        }
        normalize_batch(&mut batch, &self.settings.resolver)?;
        Ok(batch)
    }

    /// JSON report of [`CutoffDetector::detect`]; repeated files are rejected.
    pub fn detect_json(&self, files: &[String]) -> Result<String, PipelineError> {
        reject_duplicates("video", files)?;
        let batch = self.detect(files)?;
        Ok(serde_json::to_string(&batch).map_err(ScanError::from)?)
    }

    fn event_logs(&self, files: &[String]) -> Result<Vec<EventLog>, PipelineError> {
        match &self.source {
            LogSource::Fixtures(logs) => files
                .iter()
                .map(|file| {
                    logs.get(file)
                        .cloned()
                        .ok_or_else(|| PipelineError::from(InputError::MissingEventLog(file.clone())))
                })
                .collect(),
            LogSource::Scan(scanner) => {
                for file in files {
                    if !Path::new(file).is_file() {
                        return Err(InputError::FileNotFound(PathBuf::from(file)).into());
                    }
                }

                let threads = scanner.config().effective_threads();
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| PipelineError::Config(format!("thread pool: {}", e)))?;
                info!("🔧 Scanning {} files with {} matcher threads", files.len(), threads);

                pool.install(|| {
                    files
                        .iter()
                        .map(|file| -> Result<EventLog, PipelineError> {
                            info!("🎬 Scanning {}", file);
                            let source = FfmpegSource::open(Path::new(file))?;
                            Ok(scanner.scan(source)?)
                        })
                        .collect()
                })
            }
        }
    }
}

impl Drop for CutoffDetector {
    fn drop(&mut self) {
        info!("🗑️ CutoffDetector: released");
    }
}
