pub mod graph;
pub mod instruction;
pub mod transform;

pub use graph::{Action, FilterScript, Graph, StreamRef, StreamType};
pub use instruction::RenderInstruction;
pub use transform::{EncoderCapabilities, FfmpegProcessor, RenderPreset, VideoTransform};
