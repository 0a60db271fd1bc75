use serde::Serialize;
use tracing::debug;

use crate::articulation::correlation;
use crate::blend::CoScore;
use crate::models::{ArticulationMatrix, OutcomeCatalogue, OutcomeId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeAttainment {
    pub outcome: OutcomeId,
    pub attained: f64,
    /// `attained` as a share of the normalization factor.
    pub percentage: f64,
    pub contributing_cos: usize,
}

/// PO/PSO attainment of one course.
///
/// Each CO with a claimed correlation `c` and a score index contributes
/// `c * score_index / normalization_factor`; the outcome value is the mean
/// contribution. Outcomes nobody claims are left out rather than zeroed.
pub fn propagate(
    scores: &[CoScore],
    matrix: &ArticulationMatrix,
    normalization_factor: f64,
    catalogue: &OutcomeCatalogue,
) -> Vec<OutcomeAttainment> {
    catalogue
        .iter()
        .filter_map(|outcome| {
            let mut weighted_sum = 0.0;
            let mut count = 0usize;

            for score in scores {
                let Some(index) = score.score_index else {
                    continue;
                };
                if let Some(value) = correlation(matrix, &score.co, &outcome.id) {
                    weighted_sum += f64::from(value) * index / normalization_factor;
                    count += 1;
                }
            }

            if count == 0 {
                return None;
            }

            let attained = weighted_sum / count as f64;
            debug!(outcome = %outcome.id, attained, count, "propagated outcome attainment");
            Some(OutcomeAttainment {
                outcome: outcome.id.clone(),
                attained,
                percentage: attained / normalization_factor * 100.0,
                contributing_cos: count,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;

    fn catalogue() -> OutcomeCatalogue {
        OutcomeCatalogue::new(
            ["PO1", "PO2", "PO3"]
                .iter()
                .map(|id| Outcome {
                    id: id.to_string(),
                    description: String::new(),
                })
                .collect(),
        )
    }

    fn score(co: &str, index: Option<f64>) -> CoScore {
        CoScore {
            co: co.to_string(),
            cie_level: None,
            see_level: None,
            direct: index,
            indirect: 3.0,
            score_index: index,
        }
    }

    fn matrix(entries: &[(&str, &str, u8)]) -> ArticulationMatrix {
        let mut matrix = ArticulationMatrix::new();
        for (co, outcome, value) in entries {
            matrix
                .entry(co.to_string())
                .or_default()
                .insert(outcome.to_string(), *value);
        }
        matrix
    }

    #[test]
    fn full_correlation_passes_the_score_index_through() {
        let result = propagate(
            &[score("CO1", Some(2.2))],
            &matrix(&[("CO1", "PO1", 3)]),
            3.0,
            &catalogue(),
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].outcome, "PO1");
        assert!((result[0].attained - 2.2).abs() < 1e-9);
        assert!((result[0].percentage - 73.333_333).abs() < 1e-3);
    }

    #[test]
    fn averages_contributions_over_claiming_cos() {
        let result = propagate(
            &[score("CO1", Some(3.0)), score("CO2", Some(1.5))],
            &matrix(&[("CO1", "PO1", 3), ("CO2", "PO1", 2)]),
            3.0,
            &catalogue(),
        );
        // (3*3/3 + 2*1.5/3) / 2
        assert!((result[0].attained - 2.0).abs() < 1e-9);
        assert_eq!(result[0].contributing_cos, 2);
    }

    #[test]
    fn unclaimed_outcomes_are_absent_not_zero() {
        let result = propagate(
            &[score("CO1", Some(2.0))],
            &matrix(&[("CO1", "PO2", 1), ("CO1", "PO3", 0)]),
            3.0,
            &catalogue(),
        );
        let ids: Vec<&str> = result.iter().map(|o| o.outcome.as_str()).collect();
        assert_eq!(ids, vec!["PO2"]);
    }

    #[test]
    fn cos_without_data_do_not_contribute() {
        let result = propagate(
            &[score("CO1", None), score("CO2", Some(3.0))],
            &matrix(&[("CO1", "PO1", 3), ("CO2", "PO1", 3), ("CO1", "PO2", 2)]),
            3.0,
            &catalogue(),
        );
        assert_eq!(result.len(), 1);
        assert!((result[0].attained - 3.0).abs() < 1e-9);
        assert_eq!(result[0].contributing_cos, 1);
    }

    #[test]
    fn normalization_factor_is_configurable() {
        let result = propagate(
            &[score("CO1", Some(2.0))],
            &matrix(&[("CO1", "PO1", 2)]),
            2.0,
            &catalogue(),
        );
        assert!((result[0].attained - 2.0).abs() < 1e-9);
        assert!((result[0].percentage - 100.0).abs() < 1e-9);
    }
}
