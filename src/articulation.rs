use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{ConfigError, EngineError, EngineResult};
use crate::models::{ArticulationMatrix, CoId, Course, CourseId, OutcomeCatalogue, OutcomeId};

pub const MAX_CORRELATION: u8 = 3;

/// Rejects matrix rows for undeclared COs, columns outside the outcome
/// catalogue and correlations above 3.
pub fn validate_matrix(
    course: &Course,
    matrix: &ArticulationMatrix,
    catalogue: &OutcomeCatalogue,
) -> EngineResult<()> {
    for (co, row) in matrix {
        if !course.has_co(co) {
            return Err(EngineError::course(
                &course.id,
                "articulation_matrix",
                ConfigError::UnknownCo {
                    co: co.clone(),
                    context: "articulation matrix".to_string(),
                },
            ));
        }

        for (outcome, &value) in row {
            if !catalogue.contains(outcome) {
                return Err(EngineError::course(
                    &course.id,
                    "articulation_matrix",
                    ConfigError::UnknownOutcome {
                        outcome: outcome.clone(),
                        context: format!("articulation row {co}"),
                    },
                ));
            }
            if value > MAX_CORRELATION {
                return Err(EngineError::course(
                    &course.id,
                    "articulation_matrix",
                    ConfigError::Correlation {
                        co: co.clone(),
                        outcome: outcome.clone(),
                        value,
                    },
                ));
            }
        }
    }
    Ok(())
}

/// Correlation claimed between a CO and an outcome. A stored 0 is no claim.
pub fn correlation(matrix: &ArticulationMatrix, co: &str, outcome: &str) -> Option<u8> {
    matrix
        .get(co)
        .and_then(|row| row.get(outcome))
        .copied()
        .filter(|value| *value > 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationAverage {
    pub outcome: OutcomeId,
    pub average: f64,
    pub cos: usize,
}

/// Mean claimed correlation per outcome over the COs that claim it.
pub fn average_correlations(
    matrix: &ArticulationMatrix,
    catalogue: &OutcomeCatalogue,
) -> Vec<CorrelationAverage> {
    catalogue
        .iter()
        .filter_map(|outcome| {
            let values: Vec<u8> = matrix
                .keys()
                .filter_map(|co| correlation(matrix, co, &outcome.id))
                .collect();
            if values.is_empty() {
                return None;
            }
            let sum: u32 = values.iter().map(|value| u32::from(*value)).sum();
            Some(CorrelationAverage {
                outcome: outcome.id.clone(),
                average: f64::from(sum) / values.len() as f64,
                cos: values.len(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseCorrelations {
    pub course: CourseId,
    pub code: String,
    pub name: String,
    pub averages: Vec<CorrelationAverage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterMatrix {
    pub semester: u32,
    pub courses: Vec<CourseCorrelations>,
}

/// Program-level CO-PO/PSO matrix: courses grouped by semester, ordered by code.
pub fn program_matrix(
    courses: &[Course],
    matrices: &BTreeMap<CourseId, ArticulationMatrix>,
    catalogue: &OutcomeCatalogue,
) -> Vec<SemesterMatrix> {
    let mut semesters: BTreeMap<u32, Vec<CourseCorrelations>> = BTreeMap::new();

    for course in courses {
        let averages = matrices
            .get(&course.id)
            .map(|matrix| average_correlations(matrix, catalogue))
            .unwrap_or_default();
        semesters
            .entry(course.semester)
            .or_default()
            .push(CourseCorrelations {
                course: course.id.clone(),
                code: course.code.clone(),
                name: course.name.clone(),
                averages,
            });
    }

    semesters
        .into_iter()
        .map(|(semester, mut courses)| {
            courses.sort_by(|a, b| a.code.cmp(&b.code));
            SemesterMatrix { semester, courses }
        })
        .collect()
}

/// COs of a matrix that claim at least one outcome.
pub fn mapped_cos(matrix: &ArticulationMatrix) -> Vec<&CoId> {
    matrix
        .iter()
        .filter(|(_, row)| row.values().any(|value| *value > 0))
        .map(|(co, _)| co)
        .collect()
}
