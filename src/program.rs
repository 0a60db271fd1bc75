use serde::Serialize;
use tracing::debug;

use crate::error::{ConfigError, EngineError, EngineResult};
use crate::models::{OutcomeCatalogue, OutcomeId, SurveyInstrument, SurveyRecord};
use crate::propagate::OutcomeAttainment;
use crate::rules::BlendWeights;

const MAX_RATING: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramOutcomeRow {
    pub outcome: OutcomeId,
    pub description: String,
    /// Mean over the courses that claim the outcome; `None` when none do.
    pub direct: Option<f64>,
    pub claiming_courses: usize,
    pub exit_survey: Option<f64>,
    pub employer_survey: Option<f64>,
    pub alumni_survey: Option<f64>,
    /// Mean of the non-zero survey ratings; 0 without survey evidence.
    pub indirect: f64,
    pub weighted_direct: f64,
    pub weighted_indirect: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramAttainment {
    pub reference_scheme: String,
    pub weightage: BlendWeights,
    pub rows: Vec<ProgramOutcomeRow>,
}

impl ProgramAttainment {
    pub fn row(&self, outcome: &str) -> Option<&ProgramOutcomeRow> {
        self.rows.iter().find(|row| row.outcome == outcome)
    }

    pub fn direct(&self, outcome: &str) -> Option<f64> {
        self.row(outcome).and_then(|row| row.direct)
    }

    pub fn indirect(&self, outcome: &str) -> Option<f64> {
        self.row(outcome).map(|row| row.indirect)
    }

    pub fn total(&self, outcome: &str) -> Option<f64> {
        self.row(outcome).map(|row| row.total)
    }
}

/// Mean course attainment for one outcome, with the number of courses that
/// claimed it. Courses without a claim are excluded from both sides.
pub fn direct_program_attainment(
    courses: &[&[OutcomeAttainment]],
    outcome: &str,
) -> Option<(f64, usize)> {
    let values: Vec<f64> = courses
        .iter()
        .filter_map(|attainment| {
            attainment
                .iter()
                .find(|entry| entry.outcome == outcome)
                .map(|entry| entry.attained)
        })
        .collect();

    if values.is_empty() {
        None
    } else {
        Some((values.iter().sum::<f64>() / values.len() as f64, values.len()))
    }
}

/// Every survey key must be a catalogue outcome and every rating within 0..=3.
pub fn validate_survey(survey: &SurveyRecord, catalogue: &OutcomeCatalogue) -> EngineResult<()> {
    let invalid = |source| EngineError::Survey {
        department: survey.department.clone(),
        source,
    };

    for instrument in SurveyInstrument::ALL {
        for (outcome, rating) in survey.instrument(instrument) {
            if !catalogue.contains(outcome) {
                return Err(invalid(ConfigError::UnknownOutcome {
                    outcome: outcome.clone(),
                    context: instrument.label().to_string(),
                }));
            }
            if !rating.is_finite() || !(0.0..=MAX_RATING).contains(rating) {
                return Err(invalid(ConfigError::SurveyRating {
                    instrument: instrument.label(),
                    outcome: outcome.clone(),
                    value: *rating,
                }));
            }
        }
    }

    Ok(())
}

/// Mean of the present, non-zero survey ratings for one outcome, else 0.
pub fn indirect_program_attainment(survey: Option<&SurveyRecord>, outcome: &str) -> f64 {
    let Some(survey) = survey else {
        return 0.0;
    };

    let ratings: Vec<f64> = SurveyInstrument::ALL
        .iter()
        .filter_map(|instrument| survey.rating(*instrument, outcome))
        .collect();

    if ratings.is_empty() {
        0.0
    } else {
        ratings.iter().sum::<f64>() / ratings.len() as f64
    }
}

/// Program-level direct, indirect and total attainment for every catalogue
/// outcome, blended with the reference scheme's weightage.
pub fn aggregate(
    courses: &[&[OutcomeAttainment]],
    survey: Option<&SurveyRecord>,
    reference_scheme: &str,
    weightage: BlendWeights,
    catalogue: &OutcomeCatalogue,
) -> ProgramAttainment {
    let rows = catalogue
        .iter()
        .map(|outcome| {
            let direct = direct_program_attainment(courses, &outcome.id);
            let indirect = indirect_program_attainment(survey, &outcome.id);
            let weighted_direct = direct.map(|(value, _)| value).unwrap_or(0.0) * weightage.primary;
            let weighted_indirect = indirect * weightage.secondary;
            let total = weighted_direct + weighted_indirect;
            debug!(outcome = %outcome.id, ?direct, indirect, total, "aggregated program attainment");

            let rating = |instrument| survey.and_then(|survey| survey.rating(instrument, &outcome.id));
            ProgramOutcomeRow {
                outcome: outcome.id.clone(),
                description: outcome.description.clone(),
                direct: direct.map(|(value, _)| value),
                claiming_courses: direct.map(|(_, count)| count).unwrap_or(0),
                exit_survey: rating(SurveyInstrument::Exit),
                employer_survey: rating(SurveyInstrument::Employer),
                alumni_survey: rating(SurveyInstrument::Alumni),
                indirect,
                weighted_direct,
                weighted_indirect,
                total,
            }
        })
        .collect();

    ProgramAttainment {
        reference_scheme: reference_scheme.to_string(),
        weightage,
        rows,
    }
}
