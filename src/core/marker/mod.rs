pub mod detector;
pub mod matcher;
pub mod store;

pub use detector::{MarkerDetector, MarkerResults, MockMarkerDetector, TemplateDetector};
pub use matcher::{AxisRange, Bound, MarkerResult, MatchOptions, Region, Threshold};
pub use store::{Marker, MarkerStore};
