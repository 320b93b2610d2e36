pub mod frame;
pub mod similarity;
pub mod source;
pub mod walker;

pub use frame::Frame;
pub use similarity::{calculate_similarity, SkipHistory};
pub use source::{FfmpegSource, FrameSource, MemorySource};
pub use walker::{FrameWalker, WalkStep, WalkerConfig};
