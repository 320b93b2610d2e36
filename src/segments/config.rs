use serde::{Deserialize, Serialize};

use crate::core::types::Fraction;

/// Constants of the segment resolver, all in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Longest unit-selection intro kept before loading starts.
    pub intro_cutoff: Fraction,
    pub intro_cutoff_rate: Fraction,
    /// Granularity the tail of every file is rounded down to.
    pub game_cutoff_rate: Fraction,
    /// Victory/defeat banners are detected this late.
    pub conclude_lead: Fraction,
    /// Wait bound per adjacent pair of the conclude chain.
    pub wait_bounds: Vec<Fraction>,
    pub loading_span: Fraction,
    /// Shift applied to every loading screen after the first.
    pub loading_repeat_offset: Fraction,
    /// Length of the window kept after gameplay icons disappear.
    pub probe_window: Fraction,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            intro_cutoff: Fraction::from_int(3),
            intro_cutoff_rate: Fraction::new(2, 2),
            game_cutoff_rate: Fraction::new(2, 2),
            conclude_lead: Fraction::new(75, 60),
            wait_bounds: vec![Fraction::new(5, 2), Fraction::new(2, 1)],
            loading_span: Fraction::from_int(1),
            loading_repeat_offset: Fraction::from_int(1),
            probe_window: Fraction::from_int(5),
        }
    }
}
