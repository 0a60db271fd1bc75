use serde::{Deserialize, Serialize};

use crate::models::{AttainmentLevels, DirectSplit, Weightage};

pub const DEFAULT_PASS_CRITERIA: f64 = 50.0;
pub const DEFAULT_INDIRECT_RATING: f64 = 3.0;
pub const DEFAULT_NORMALIZATION_FACTOR: f64 = 3.0;
pub const IMPROVEMENT_THRESHOLD: f64 = 2.0;

/// Defaults and fixed constants handed to every engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_pass_criteria: f64,
    pub default_levels: AttainmentLevels,
    pub default_weightage: Weightage,
    pub default_direct_split: DirectSplit,
    pub default_normalization_factor: f64,
    /// Rating assumed for a CO that has not been surveyed yet.
    pub default_indirect_rating: f64,
    /// Totals strictly below this value (and above zero) need remediation.
    pub improvement_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_pass_criteria: DEFAULT_PASS_CRITERIA,
            default_levels: AttainmentLevels {
                level_3: 70.0,
                level_2: 60.0,
                level_1: 50.0,
            },
            default_weightage: Weightage {
                direct: 80.0,
                indirect: 20.0,
            },
            default_direct_split: DirectSplit {
                cie: 50.0,
                see: 50.0,
            },
            default_normalization_factor: DEFAULT_NORMALIZATION_FACTOR,
            default_indirect_rating: DEFAULT_INDIRECT_RATING,
            improvement_threshold: IMPROVEMENT_THRESHOLD,
        }
    }
}
