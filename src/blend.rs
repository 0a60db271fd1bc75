use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::direct::DirectAttainment;
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::models::{CoId, Course};
use crate::rules::BlendWeights;

const MAX_RATING: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoScore {
    pub co: CoId,
    pub cie_level: Option<u8>,
    pub see_level: Option<u8>,
    /// `None` when the course has no enrolled students.
    pub direct: Option<f64>,
    pub indirect: f64,
    pub score_index: Option<f64>,
}

/// `w_direct * direct + w_indirect * indirect`, or no data without a direct level.
pub fn score_index(direct: Option<f64>, indirect: f64, weightage: &BlendWeights) -> Option<f64> {
    direct.map(|direct| weightage.blend(direct, indirect))
}

/// Blends every declared CO's direct level with its surveyed rating.
pub fn blend_course(
    course: &Course,
    direct: Option<&DirectAttainment>,
    weightage: &BlendWeights,
    config: &EngineConfig,
) -> EngineResult<Vec<CoScore>> {
    for (co, rating) in &course.settings.indirect_attainment {
        if !course.has_co(co) {
            return Err(EngineError::course(
                &course.id,
                "settings.indirect_attainment",
                ConfigError::UnknownCo {
                    co: co.clone(),
                    context: "indirect attainment".to_string(),
                },
            ));
        }
        if !rating.is_finite() || !(0.0..=MAX_RATING).contains(rating) {
            return Err(EngineError::course(
                &course.id,
                "settings.indirect_attainment",
                ConfigError::IndirectRating {
                    co: co.clone(),
                    value: *rating,
                },
            ));
        }
    }

    let scores = course
        .cos
        .iter()
        .map(|declared| {
            let entry = direct.and_then(|direct| direct.cos.iter().find(|co| co.co == declared.id));
            let indirect = course
                .settings
                .indirect_attainment
                .get(&declared.id)
                .copied()
                .unwrap_or(config.default_indirect_rating);
            let direct_level = entry.map(|co| co.direct);
            let score_index = score_index(direct_level, indirect, weightage);
            debug!(course = %course.id, co = %declared.id, ?direct_level, indirect, ?score_index, "blended CO score");

            CoScore {
                co: declared.id.clone(),
                cie_level: entry.map(|co| co.cie_level),
                see_level: entry.map(|co| co.see_level),
                direct: direct_level,
                indirect,
                score_index,
            }
        })
        .collect();

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::{CoDirect, Tally};
    use crate::models::{CourseOutcome, CourseSettings};

    fn weights(direct: f64, indirect: f64) -> BlendWeights {
        BlendWeights::from_percentages("weightage", direct, indirect).expect("valid weights")
    }

    fn course(indirect: &[(&str, f64)]) -> Course {
        Course {
            id: "C101".to_string(),
            code: "CS101".to_string(),
            name: String::new(),
            credits: 3,
            semester: 1,
            scheme: None,
            cos: ["CO1", "CO2"]
                .iter()
                .map(|id| CourseOutcome {
                    id: id.to_string(),
                    description: String::new(),
                })
                .collect(),
            assessment_tools: Vec::new(),
            settings: CourseSettings {
                indirect_attainment: indirect
                    .iter()
                    .map(|(co, rating)| (co.to_string(), *rating))
                    .collect(),
            },
        }
    }

    fn direct(levels: &[(&str, f64)]) -> DirectAttainment {
        DirectAttainment {
            see: None,
            cos: levels
                .iter()
                .map(|(co, level)| CoDirect {
                    co: co.to_string(),
                    cie: Tally::default(),
                    cie_percentage: 0.0,
                    cie_level: (*level * 2.0) as u8,
                    see_level: 0,
                    direct: *level,
                })
                .collect(),
        }
    }

    #[test]
    fn blends_direct_and_indirect_with_scheme_weights() {
        let value = score_index(Some(2.0), 3.0, &weights(80.0, 20.0)).expect("direct present");
        assert!((value - 2.2).abs() < 1e-9);
    }

    #[test]
    fn score_index_stays_on_the_rating_scale() {
        for direct_weight in (0..=100).step_by(10) {
            let weightage = weights(direct_weight as f64, 100.0 - direct_weight as f64);
            for step in 0..=6 {
                let level = step as f64 * 0.5;
                for indirect in [0.0, 1.5, 3.0] {
                    let value = score_index(Some(level), indirect, &weightage)
                        .expect("direct present");
                    assert!((0.0..=3.0 + 1e-9).contains(&value));
                }
            }
        }
    }

    #[test]
    fn missing_direct_level_stays_missing() {
        assert_eq!(score_index(None, 3.0, &weights(80.0, 20.0)), None);
    }

    #[test]
    fn unsurveyed_cos_use_the_default_rating() {
        let course = course(&[("CO1", 1.0)]);
        let scores = blend_course(
            &course,
            Some(&direct(&[("CO1", 2.0), ("CO2", 1.0)])),
            &weights(80.0, 20.0),
            &EngineConfig::default(),
        )
        .expect("valid course");

        assert_eq!(scores[0].indirect, 1.0);
        assert!((scores[0].score_index.expect("data") - 1.8).abs() < 1e-9);
        assert_eq!(scores[1].indirect, 3.0);
        assert!((scores[1].score_index.expect("data") - 1.4).abs() < 1e-9);
    }

    #[test]
    fn no_enrolment_leaves_every_score_index_empty() {
        let scores = blend_course(
            &course(&[]),
            None,
            &weights(80.0, 20.0),
            &EngineConfig::default(),
        )
        .expect("valid course");
        assert!(scores.iter().all(|score| score.score_index.is_none()));
        assert!(scores.iter().all(|score| score.indirect == 3.0));
    }

    #[test]
    fn out_of_range_indirect_rating_is_rejected() {
        let err = blend_course(
            &course(&[("CO1", 4.0)]),
            None,
            &weights(80.0, 20.0),
            &EngineConfig::default(),
        )
        .expect_err("rating above 3");
        assert!(err.to_string().contains("course C101"));
    }
}
