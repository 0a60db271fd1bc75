use serde::Serialize;
use tracing::{info, warn};

use crate::articulation::{mapped_cos, program_matrix, validate_matrix, SemesterMatrix};
use crate::blend::{blend_course, CoScore};
use crate::bundle::{validate_marks, CourseInput, DepartmentBundle};
use crate::config::EngineConfig;
use crate::direct::{compute_direct, unique_students, SeeAttainment};
use crate::error::{EngineError, EngineResult};
use crate::improvement::{detect_low_attainment, LowAttainmentReport};
use crate::models::{CoId, Course, CourseId, OutcomeCatalogue, Scheme, SchemeSettings};
use crate::program::{aggregate, validate_survey, ProgramAttainment};
use crate::propagate::{propagate, OutcomeAttainment};
use crate::rules::Rules;

pub const GLOBAL_DEFAULT_SCHEME: &str = "Global Default";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseReport {
    pub course: CourseId,
    pub code: String,
    pub name: String,
    pub semester: u32,
    pub scheme: String,
    pub enrolled: usize,
    pub see: Option<SeeAttainment>,
    pub co: Vec<CoScore>,
    pub po_attainment: Vec<OutcomeAttainment>,
    /// Declared COs that claim no outcome in the articulation matrix.
    pub unmapped_cos: Vec<CoId>,
}

impl CourseReport {
    pub fn attainment(&self, outcome: &str) -> Option<f64> {
        self.po_attainment
            .iter()
            .find(|entry| entry.outcome == outcome)
            .map(|entry| entry.attained)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramReport {
    pub department: String,
    pub courses: Vec<CourseReport>,
    pub program: ProgramAttainment,
    pub low_attainment: LowAttainmentReport,
    pub matrix: Vec<SemesterMatrix>,
}

/// Stateless pipeline runner; every call reads only its arguments.
#[derive(Debug, Clone, Default)]
pub struct AttainmentEngine {
    config: EngineConfig,
}

impl AttainmentEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rules governing a course: its own scheme, else the global settings,
    /// else the engine defaults.
    pub fn course_rules(
        &self,
        course: &Course,
        schemes: &[Scheme],
        global_settings: Option<&SchemeSettings>,
    ) -> EngineResult<(String, Rules)> {
        match course.scheme.as_deref() {
            Some(scheme_id) => {
                let scheme = schemes
                    .iter()
                    .find(|scheme| scheme.id == scheme_id)
                    .ok_or_else(|| EngineError::MissingScheme {
                        course: course.id.clone(),
                        scheme: scheme_id.to_string(),
                    })?;
                let rules = Rules::for_course(&course.id, &scheme.settings, &self.config)?;
                Ok((scheme.name.clone(), rules))
            }
            None => {
                let fallback = SchemeSettings::default();
                let settings = global_settings.unwrap_or(&fallback);
                let rules = Rules::for_course(&course.id, settings, &self.config)?;
                Ok((GLOBAL_DEFAULT_SCHEME.to_string(), rules))
            }
        }
    }

    /// CO score indices and PO/PSO attainment for one course.
    pub fn course_report(
        &self,
        input: &CourseInput<'_>,
        catalogue: &OutcomeCatalogue,
    ) -> EngineResult<CourseReport> {
        let course = input.course;
        let (scheme, rules) = self.course_rules(course, input.schemes, input.global_settings)?;

        validate_marks(course, input.marks)?;
        if let Some(matrix) = input.matrix {
            validate_matrix(course, matrix, catalogue)?;
        }

        let direct = compute_direct(course, input.roster, input.marks, &rules)?;
        let enrolled = unique_students(input.roster).len();
        let co = blend_course(course, direct.as_ref(), &rules.weightage, &self.config)?;

        let (po_attainment, unmapped_cos) = match input.matrix {
            Some(matrix) => {
                let mapped = mapped_cos(matrix);
                let unmapped: Vec<CoId> = course
                    .co_ids()
                    .into_iter()
                    .filter(|co| !mapped.contains(&co))
                    .collect();
                (
                    propagate(&co, matrix, rules.normalization_factor, catalogue),
                    unmapped,
                )
            }
            None => {
                warn!(course = %course.id, "no articulation matrix, outcome attainment has no data");
                (Vec::new(), course.co_ids())
            }
        };

        info!(
            course = %course.id,
            scheme = %scheme,
            enrolled,
            outcomes = po_attainment.len(),
            "computed course attainment"
        );

        Ok(CourseReport {
            course: course.id.clone(),
            code: course.code.clone(),
            name: course.name.clone(),
            semester: course.semester,
            scheme,
            enrolled,
            see: direct.and_then(|direct| direct.see),
            co,
            po_attainment,
            unmapped_cos,
        })
    }

    /// Name and rules of the scheme whose weightage blends the program summary.
    pub fn reference_rules(
        &self,
        bundle: &DepartmentBundle,
        reference_scheme: Option<&str>,
    ) -> EngineResult<(String, Rules)> {
        let requested = reference_scheme.or(bundle.reference_scheme.as_deref());

        let scheme = match requested {
            Some(id) => Some(
                bundle
                    .schemes
                    .iter()
                    .find(|scheme| scheme.id == id)
                    .ok_or_else(|| EngineError::UnknownReferenceScheme(id.to_string()))?,
            ),
            None => bundle.schemes.first(),
        };

        match scheme {
            Some(scheme) => {
                let rules = Rules::for_scheme(&scheme.id, &scheme.settings, &self.config)?;
                Ok((scheme.name.clone(), rules))
            }
            None => {
                let fallback = SchemeSettings::default();
                let settings = bundle.global_settings.as_ref().unwrap_or(&fallback);
                let rules = Rules::for_scheme(GLOBAL_DEFAULT_SCHEME, settings, &self.config)?;
                Ok((GLOBAL_DEFAULT_SCHEME.to_string(), rules))
            }
        }
    }

    /// Every course of the department, aggregated into program attainment.
    pub fn program_report(
        &self,
        bundle: &DepartmentBundle,
        reference_scheme: Option<&str>,
    ) -> EngineResult<ProgramReport> {
        let catalogue = bundle.catalogue();
        let (reference_name, reference) = self.reference_rules(bundle, reference_scheme)?;

        if let Some(survey) = &bundle.survey {
            validate_survey(survey, &catalogue)?;
        }

        let orphaned = bundle.orphaned_marks().count();
        if orphaned > 0 {
            warn!(orphaned, "ignoring marks for courses outside the department");
        }

        let mut courses = bundle
            .courses
            .iter()
            .map(|course| self.course_report(&bundle.course_input(course), &catalogue))
            .collect::<EngineResult<Vec<_>>>()?;
        courses.sort_by(|a, b| a.code.cmp(&b.code));

        let per_course: Vec<&[OutcomeAttainment]> = courses
            .iter()
            .map(|report| report.po_attainment.as_slice())
            .collect();
        let program = aggregate(
            &per_course,
            bundle.survey.as_ref(),
            &reference_name,
            reference.weightage,
            &catalogue,
        );
        let low_attainment = detect_low_attainment(&program, self.config.improvement_threshold);
        let matrix = program_matrix(&bundle.courses, &bundle.articulation, &catalogue);

        info!(
            department = %bundle.department,
            courses = courses.len(),
            flagged = low_attainment.flagged.len(),
            reference = %reference_name,
            "computed program attainment"
        );

        Ok(ProgramReport {
            department: bundle.department.clone(),
            courses,
            program,
            low_attainment,
            matrix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssessmentTool, CourseOutcome, CourseSettings, ToolType, Weightage};
    use std::collections::BTreeMap;

    fn course(scheme: Option<&str>) -> Course {
        Course {
            id: "C1".to_string(),
            code: "CS101".to_string(),
            name: "Programming".to_string(),
            credits: 4,
            semester: 1,
            scheme: scheme.map(str::to_string),
            cos: vec![CourseOutcome {
                id: "CO1".to_string(),
                description: String::new(),
            }],
            assessment_tools: vec![AssessmentTool {
                id: "T1".to_string(),
                name: "IA1".to_string(),
                kind: ToolType::InternalAssessment,
                max_marks: 10.0,
                co_distribution: BTreeMap::from([("CO1".to_string(), 10.0)]),
            }],
            settings: CourseSettings::default(),
        }
    }

    fn scheme(id: &str, direct: f64, indirect: f64) -> Scheme {
        Scheme {
            id: id.to_string(),
            name: format!("{id} scheme"),
            settings: SchemeSettings {
                weightage: Some(Weightage { direct, indirect }),
                ..SchemeSettings::default()
            },
        }
    }

    #[test]
    fn course_without_scheme_uses_global_default() {
        let engine = AttainmentEngine::default();
        let (name, rules) = engine
            .course_rules(&course(None), &[], None)
            .expect("defaults resolve");
        assert_eq!(name, GLOBAL_DEFAULT_SCHEME);
        assert_eq!(rules.pass_criteria, 50.0);
    }

    #[test]
    fn course_naming_a_missing_scheme_is_an_error() {
        let engine = AttainmentEngine::default();
        let err = engine
            .course_rules(&course(Some("S2018")), &[scheme("S2022", 80.0, 20.0)], None)
            .expect_err("scheme not supplied");
        assert_eq!(
            err,
            EngineError::MissingScheme {
                course: "C1".to_string(),
                scheme: "S2018".to_string()
            }
        );
    }

    #[test]
    fn course_without_matrix_reports_no_outcomes() {
        let engine = AttainmentEngine::default();
        let course = course(None);
        let roster = vec!["S1".to_string()];
        let input = CourseInput {
            course: &course,
            roster: &roster,
            marks: &[],
            matrix: None,
            schemes: &[],
            global_settings: None,
        };
        let report = engine
            .course_report(&input, &OutcomeCatalogue::default())
            .expect("valid course");
        assert!(report.po_attainment.is_empty());
        assert_eq!(report.unmapped_cos, vec!["CO1".to_string()]);
        let score_index = report.co[0].score_index.expect("student enrolled");
        assert!((score_index - 0.6).abs() < 1e-9);
    }

    #[test]
    fn explicit_reference_scheme_overrides_the_bundle_choice() {
        let engine = AttainmentEngine::default();
        let bundle = DepartmentBundle {
            department: "CSE".to_string(),
            schemes: vec![scheme("S2018", 70.0, 30.0), scheme("S2022", 60.0, 40.0)],
            reference_scheme: Some("S2018".to_string()),
            ..DepartmentBundle::default()
        };

        let (name, rules) = engine
            .reference_rules(&bundle, Some("S2022"))
            .expect("scheme exists");
        assert_eq!(name, "S2022 scheme");
        assert!((rules.weightage.primary - 0.6).abs() < 1e-9);

        let (name, _) = engine.reference_rules(&bundle, None).expect("bundle choice");
        assert_eq!(name, "S2018 scheme");

        assert_eq!(
            engine.reference_rules(&bundle, Some("S1999")),
            Err(EngineError::UnknownReferenceScheme("S1999".to_string()))
        );
    }
}
