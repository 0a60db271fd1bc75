use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    deserialize_matrices, ArticulationMatrix, Course, CourseId, MarksRecord, Outcome,
    OutcomeCatalogue, Scheme, SchemeSettings, StudentId, SurveyRecord, ToolType,
};

/// Immutable snapshot of everything one department computation reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepartmentBundle {
    pub department: String,
    #[serde(default)]
    pub schemes: Vec<Scheme>,
    /// Settings for courses that do not name a scheme.
    #[serde(default)]
    pub global_settings: Option<SchemeSettings>,
    /// Scheme whose weightage blends the program-level summary.
    #[serde(default)]
    pub reference_scheme: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub enrollments: BTreeMap<CourseId, Vec<StudentId>>,
    #[serde(default)]
    pub marks: Vec<MarksRecord>,
    #[serde(default, deserialize_with = "deserialize_matrices")]
    pub articulation: BTreeMap<CourseId, ArticulationMatrix>,
    #[serde(default)]
    pub survey: Option<SurveyRecord>,
}

/// Borrowed inputs for one course computation.
#[derive(Debug, Clone, Copy)]
pub struct CourseInput<'a> {
    pub course: &'a Course,
    pub roster: &'a [StudentId],
    pub marks: &'a [MarksRecord],
    pub matrix: Option<&'a ArticulationMatrix>,
    pub schemes: &'a [Scheme],
    pub global_settings: Option<&'a SchemeSettings>,
}

impl DepartmentBundle {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn catalogue(&self) -> OutcomeCatalogue {
        OutcomeCatalogue::new(self.outcomes.clone())
    }

    pub fn course(&self, id: &str) -> Option<&Course> {
        self.courses
            .iter()
            .find(|course| course.id == id || course.code == id)
    }

    pub fn require_course(&self, id: &str) -> EngineResult<&Course> {
        self.course(id)
            .ok_or_else(|| EngineError::UnknownCourse(id.to_string()))
    }

    pub fn roster(&self, course: &str) -> &[StudentId] {
        self.enrollments
            .get(course)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn course_input<'a>(&'a self, course: &'a Course) -> CourseInput<'a> {
        CourseInput {
            course,
            roster: self.roster(&course.id),
            marks: &self.marks,
            matrix: self.articulation.get(&course.id),
            schemes: &self.schemes,
            global_settings: self.global_settings.as_ref(),
        }
    }

    /// Marks whose course is not part of the bundle.
    pub fn orphaned_marks(&self) -> impl Iterator<Item = &MarksRecord> {
        let known: BTreeSet<&str> = self.courses.iter().map(|course| course.id.as_str()).collect();
        self.marks
            .iter()
            .filter(move |record| !known.contains(record.course.as_str()))
    }
}

/// Boundary checks on one course's marks: no duplicate regular records per
/// student and assessment, and internal assessment scores keyed by declared COs.
pub fn validate_marks(course: &Course, marks: &[MarksRecord]) -> EngineResult<()> {
    let mut seen = BTreeSet::new();

    for record in marks.iter().filter(|record| record.course == course.id) {
        if !record.is_improvement()
            && !seen.insert((record.student.as_str(), record.assessment_name.as_str()))
        {
            return Err(EngineError::DuplicateMarks {
                student: record.student.clone(),
                course: course.id.clone(),
                assessment: record.assessment_name.clone(),
            });
        }

        let keyed_by_co = record.is_improvement()
            || course.assessment_tools.iter().any(|tool| {
                tool.name == record.assessment_name
                    && matches!(
                        tool.kind,
                        ToolType::InternalAssessment | ToolType::ImprovementTest
                    )
            });
        if !keyed_by_co {
            continue;
        }

        if let Some(key) = record.scores.keys().find(|key| !course.has_co(key)) {
            return Err(EngineError::UnknownScoreKey {
                student: record.student.clone(),
                course: course.id.clone(),
                assessment: record.assessment_name.clone(),
                key: key.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssessmentTool, CourseOutcome, CourseSettings, Score};

    fn course() -> Course {
        Course {
            id: "C1".to_string(),
            code: "CS101".to_string(),
            name: String::new(),
            credits: 4,
            semester: 1,
            scheme: None,
            cos: vec![CourseOutcome {
                id: "CO1".to_string(),
                description: String::new(),
            }],
            assessment_tools: vec![
                AssessmentTool {
                    id: "T1".to_string(),
                    name: "IA1".to_string(),
                    kind: ToolType::InternalAssessment,
                    max_marks: 10.0,
                    co_distribution: BTreeMap::from([("CO1".to_string(), 10.0)]),
                },
                AssessmentTool {
                    id: "T2".to_string(),
                    name: "SEE".to_string(),
                    kind: ToolType::SemesterEndExam,
                    max_marks: 100.0,
                    co_distribution: BTreeMap::new(),
                },
            ],
            settings: CourseSettings::default(),
        }
    }

    fn record(student: &str, assessment: &str, key: &str) -> MarksRecord {
        MarksRecord {
            student: student.to_string(),
            course: "C1".to_string(),
            assessment_name: assessment.to_string(),
            scores: BTreeMap::from([(key.to_string(), Score::Marks(5.0))]),
            improvement_test_for: None,
        }
    }

    #[test]
    fn accepts_question_keys_for_the_end_exam() {
        let marks = vec![record("S1", "IA1", "CO1"), record("S1", "SEE", "External")];
        assert!(validate_marks(&course(), &marks).is_ok());
    }

    #[test]
    fn rejects_unknown_co_keys_in_internal_marks() {
        let marks = vec![record("S1", "IA1", "CO4")];
        assert_eq!(
            validate_marks(&course(), &marks),
            Err(EngineError::UnknownScoreKey {
                student: "S1".to_string(),
                course: "C1".to_string(),
                assessment: "IA1".to_string(),
                key: "CO4".to_string(),
            })
        );
    }

    #[test]
    fn rejects_duplicate_regular_records() {
        let marks = vec![record("S1", "IA1", "CO1"), record("S1", "IA1", "CO1")];
        assert!(matches!(
            validate_marks(&course(), &marks),
            Err(EngineError::DuplicateMarks { .. })
        ));
    }

    #[test]
    fn parses_a_minimal_bundle() {
        let bundle = DepartmentBundle::from_json(
            r#"{
                "department": "CSE",
                "outcomes": [{"id": "PO2"}, {"id": "PO1"}],
                "courses": [{"id": "C1", "code": "CS101", "cos": [{"id": "CO1"}]}],
                "enrollments": {"C1": ["S1", "S2"]},
                "articulation": {"C1": {"CO1": {"PO1": 3}}}
            }"#,
        )
        .expect("bundle parses");

        assert_eq!(bundle.roster("C1").len(), 2);
        assert!(bundle.roster("C9").is_empty());
        assert_eq!(bundle.course("CS101").map(|c| c.id.as_str()), Some("C1"));
        assert_eq!(
            bundle.require_course("CS999"),
            Err(EngineError::UnknownCourse("CS999".to_string()))
        );
        let input = bundle.course_input(&bundle.courses[0]);
        assert!(input.matrix.is_some());
        let ids: Vec<String> = bundle.catalogue().iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec!["PO1", "PO2"]);
    }
}
