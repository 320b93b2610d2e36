pub mod error;
pub mod marker;
pub mod types;
pub mod video;
