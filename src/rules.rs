use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::models::{IndirectTool, SchemeSettings};
use crate::threshold::ThresholdTable;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// A pair of blend weights expressed as fractions summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlendWeights {
    pub primary: f64,
    pub secondary: f64,
}

impl BlendWeights {
    /// Validates two percentages summing to 100 and converts them to fractions.
    pub fn from_percentages(
        field: &'static str,
        primary: f64,
        secondary: f64,
    ) -> Result<Self, ConfigError> {
        for value in [primary, secondary] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { field, value });
            }
        }

        let sum = primary + secondary;
        if (sum - 100.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightSum { field, sum });
        }

        Ok(Self {
            primary: primary / 100.0,
            secondary: secondary / 100.0,
        })
    }

    pub fn blend(&self, primary: f64, secondary: f64) -> f64 {
        self.primary * primary + self.secondary * secondary
    }
}

/// Validated scheme rules with every default filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rules {
    pub pass_criteria: f64,
    pub thresholds: ThresholdTable,
    /// Direct vs indirect weights.
    pub weightage: BlendWeights,
    /// CIE vs SEE weights within direct attainment. Validated only; the direct
    /// level is always the plain mean of the CIE and SEE levels.
    pub direct_split: BlendWeights,
    pub normalization_factor: f64,
    /// Validated only; program indirect attainment is the plain survey mean.
    pub indirect_tools: Vec<IndirectTool>,
}

impl Rules {
    pub fn for_course(
        course: &str,
        settings: &SchemeSettings,
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        resolve(settings, config).map_err(|(field, source)| EngineError::course(course, field, source))
    }

    pub fn for_scheme(
        scheme: &str,
        settings: &SchemeSettings,
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        resolve(settings, config).map_err(|(field, source)| EngineError::scheme(scheme, field, source))
    }

    /// Marks a student must reach out of `max_marks` to meet the target.
    pub fn target_for(&self, max_marks: f64) -> f64 {
        max_marks * self.pass_criteria / 100.0
    }
}

fn resolve(
    settings: &SchemeSettings,
    config: &EngineConfig,
) -> Result<Rules, (&'static str, ConfigError)> {
    let pass_criteria = settings
        .pass_criteria
        .unwrap_or(config.default_pass_criteria);
    if !(0.0..=100.0).contains(&pass_criteria) {
        return Err(("pass_criteria", ConfigError::PassCriteria(pass_criteria)));
    }

    let levels = settings.attainment_levels.unwrap_or(config.default_levels);
    let thresholds =
        ThresholdTable::from_levels(&levels).map_err(|err| ("attainment_levels", err))?;

    let weightage = settings.weightage.unwrap_or(config.default_weightage);
    let weightage =
        BlendWeights::from_percentages("weightage", weightage.direct, weightage.indirect)
            .map_err(|err| ("weightage", err))?;

    let split = settings
        .direct_split
        .unwrap_or(config.default_direct_split);
    let direct_split = BlendWeights::from_percentages("direct_split", split.cie, split.see)
        .map_err(|err| ("direct_split", err))?;

    let normalization_factor = settings
        .normalization_divisor()
        .unwrap_or(config.default_normalization_factor);
    if !normalization_factor.is_finite() || normalization_factor <= 0.0 {
        return Err((
            "normalization_factor",
            ConfigError::NormalizationFactor(normalization_factor),
        ));
    }

    for tool in &settings.indirect_tools {
        if !tool.weight.is_finite() || tool.weight < 0.0 {
            return Err((
                "indirect_tools",
                ConfigError::InvalidWeight {
                    field: "indirect_tools",
                    value: tool.weight,
                },
            ));
        }
    }

    Ok(Rules {
        pass_criteria,
        thresholds,
        weightage,
        direct_split,
        normalization_factor,
        indirect_tools: settings.indirect_tools.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttainmentLevels, Weightage};

    #[test]
    fn empty_settings_resolve_to_engine_defaults() {
        let rules = Rules::for_course("C101", &SchemeSettings::default(), &EngineConfig::default())
            .expect("defaults are valid");
        assert_eq!(rules.pass_criteria, 50.0);
        assert_eq!(rules.normalization_factor, 3.0);
        assert!((rules.weightage.primary - 0.8).abs() < 1e-9);
        assert!((rules.weightage.secondary - 0.2).abs() < 1e-9);
        assert_eq!(rules.thresholds.classify(72.0), 3);
        assert_eq!(rules.target_for(20.0), 10.0);
    }

    #[test]
    fn scheme_values_override_defaults() {
        let settings = SchemeSettings {
            pass_criteria: Some(60.0),
            attainment_levels: Some(AttainmentLevels {
                level_3: 80.0,
                level_2: 70.0,
                level_1: 60.0,
            }),
            weightage: Some(Weightage {
                direct: 90.0,
                indirect: 10.0,
            }),
            normalization_factor: Some(2.0),
            ..SchemeSettings::default()
        };
        let rules = Rules::for_scheme("S2022", &settings, &EngineConfig::default())
            .expect("valid settings");
        assert_eq!(rules.pass_criteria, 60.0);
        assert_eq!(rules.thresholds.classify(72.0), 2);
        assert!((rules.weightage.primary - 0.9).abs() < 1e-9);
        assert_eq!(rules.normalization_factor, 2.0);
    }

    #[test]
    fn weights_not_summing_to_hundred_name_the_course_and_field() {
        let settings = SchemeSettings {
            weightage: Some(Weightage {
                direct: 70.0,
                indirect: 20.0,
            }),
            ..SchemeSettings::default()
        };
        let err = Rules::for_course("C101", &settings, &EngineConfig::default())
            .expect_err("weights are malformed");
        assert_eq!(
            err,
            EngineError::Course {
                course: "C101".to_string(),
                field: "weightage",
                source: ConfigError::WeightSum {
                    field: "weightage",
                    sum: 90.0
                },
            }
        );
    }

    #[test]
    fn nested_normalization_factor_reaches_the_rules() {
        let settings: SchemeSettings =
            serde_json::from_str(r#"{"po_calculation": {"normalization_factor": 2}}"#)
                .expect("settings parse");
        let rules = Rules::for_scheme("S2018", &settings, &EngineConfig::default())
            .expect("valid settings");
        assert_eq!(rules.normalization_factor, 2.0);
    }

    #[test]
    fn rejects_non_positive_normalization_factor() {
        let settings = SchemeSettings {
            normalization_factor: Some(0.0),
            ..SchemeSettings::default()
        };
        let err = Rules::for_scheme("S1", &settings, &EngineConfig::default())
            .expect_err("divisor must be positive");
        assert!(err.to_string().contains("normalization_factor"));
    }

    #[test]
    fn blend_weights_combine_linearly() {
        let weights = BlendWeights::from_percentages("weightage", 80.0, 20.0).expect("valid");
        assert!((weights.blend(2.0, 3.0) - 2.2).abs() < 1e-9);
    }
}
