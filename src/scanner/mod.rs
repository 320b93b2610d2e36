pub mod config;
pub mod evaluators;
pub mod event_log;
pub mod hooks;
pub mod session;
pub mod state;

pub use config::{marker_names, DetectionTuning, ScanConfig, MARKER_SETTINGS};
pub use evaluators::{EvaluatorPipeline, FrameEvaluator, FrameEvent};
pub use event_log::{EventLog, StateData};
pub use hooks::{HookContext, HookRegistry, StateHook};
pub use session::Scanner;
pub use state::{FrameData, StateChanges, StateSet, StateVector, VideoState};
