pub mod fraction;
pub mod timespan;

pub use fraction::Fraction;
pub use timespan::Timespan;
