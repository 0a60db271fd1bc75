use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::error::{ConfigError, EngineError, EngineResult};
use crate::models::{
    normalize_name, AssessmentTool, CoId, Course, MarksRecord, Score, StudentId,
};
use crate::rules::Rules;

/// Pass/attempt counter behind a percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub attempts: usize,
    pub passed: usize,
}

impl Tally {
    pub fn record(&mut self, met_target: bool) {
        self.attempts += 1;
        if met_target {
            self.passed += 1;
        }
    }

    /// Share of attempts that met the target, 0 when nothing was attempted.
    pub fn percentage(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.passed as f64 / self.attempts as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeeAttainment {
    pub tool: String,
    pub tally: Tally,
    pub percentage: f64,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoDirect {
    pub co: CoId,
    pub cie: Tally,
    pub cie_percentage: f64,
    pub cie_level: u8,
    pub see_level: u8,
    /// Mean of the CIE and SEE levels, may be fractional.
    pub direct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectAttainment {
    /// `None` when the course has no semester end exam; its level counts as 0.
    pub see: Option<SeeAttainment>,
    pub cos: Vec<CoDirect>,
}

impl DirectAttainment {
    pub fn level_for(&self, co: &str) -> Option<f64> {
        self.cos
            .iter()
            .find(|entry| entry.co == co)
            .map(|entry| entry.direct)
    }
}

/// Checks every tool's max marks and CO distribution against the course.
pub fn validate_tools(course: &Course) -> EngineResult<()> {
    for tool in &course.assessment_tools {
        if !tool.max_marks.is_finite() || tool.max_marks < 0.0 {
            return Err(EngineError::course(
                &course.id,
                "assessment_tools",
                ConfigError::MaxMarks {
                    tool: tool.name.clone(),
                    value: tool.max_marks,
                },
            ));
        }

        for co in tool.co_distribution.keys() {
            if !course.has_co(co) {
                return Err(EngineError::course(
                    &course.id,
                    "assessment_tools",
                    ConfigError::UnknownCo {
                        co: co.clone(),
                        context: format!("assessment tool {}", tool.name),
                    },
                ));
            }
        }
    }
    Ok(())
}

/// Direct attainment level per declared CO of one course.
///
/// Returns `Ok(None)` when nobody is enrolled, which callers must keep apart
/// from a cohort that enrolled and failed.
pub fn compute_direct(
    course: &Course,
    roster: &[StudentId],
    marks: &[MarksRecord],
    rules: &Rules,
) -> EngineResult<Option<DirectAttainment>> {
    validate_tools(course)?;

    let roster = unique_students(roster);
    if roster.is_empty() {
        debug!(course = %course.id, "no enrolled students, direct attainment has no data");
        return Ok(None);
    }

    let by_student = group_by_student(course, &roster, marks);
    let declared = course.co_ids();

    let mut tallies: BTreeMap<CoId, Tally> = declared
        .iter()
        .map(|co| (co.clone(), Tally::default()))
        .collect();

    for tool in course.cie_tools() {
        let allocations = tool.allocations(&declared);
        if allocations.is_empty() {
            continue;
        }

        for student in &roster {
            let Some(records) = by_student.get(student.as_str()) else {
                continue;
            };
            let Some(scores) = effective_scores(records, tool, &allocations) else {
                continue;
            };

            for (co, co_max) in &allocations {
                if let Some(Score::Marks(obtained)) = scores.get(co.as_str()) {
                    tallies
                        .entry(co.clone())
                        .or_default()
                        .record(*obtained >= rules.target_for(*co_max));
                }
            }
        }
    }

    let see = course
        .see_tool()
        .map(|tool| see_attainment(tool, &roster, &by_student, rules));
    let see_level = see.as_ref().map(|see| see.level).unwrap_or(0);

    let cos = declared
        .iter()
        .map(|co| {
            let cie = tallies.get(co).copied().unwrap_or_default();
            let cie_percentage = cie.percentage();
            let cie_level = rules.thresholds.classify(cie_percentage);
            let direct = (f64::from(cie_level) + f64::from(see_level)) / 2.0;
            debug!(
                course = %course.id,
                co = %co,
                attempts = cie.attempts,
                passed = cie.passed,
                cie_level,
                see_level,
                direct,
                "computed direct CO attainment"
            );
            CoDirect {
                co: co.clone(),
                cie,
                cie_percentage,
                cie_level,
                see_level,
                direct,
            }
        })
        .collect();

    Ok(Some(DirectAttainment { see, cos }))
}

/// Roster ids in first-seen order with repeats dropped.
pub fn unique_students(roster: &[StudentId]) -> Vec<&StudentId> {
    let mut seen = BTreeSet::new();
    roster
        .iter()
        .filter(|student| seen.insert(*student))
        .collect()
}

fn group_by_student<'a>(
    course: &Course,
    roster: &[&StudentId],
    marks: &'a [MarksRecord],
) -> BTreeMap<&'a str, Vec<&'a MarksRecord>> {
    let enrolled: BTreeSet<&str> = roster.iter().map(|student| student.as_str()).collect();
    let mut grouped: BTreeMap<&str, Vec<&MarksRecord>> = BTreeMap::new();

    for record in marks.iter().filter(|record| record.course == course.id) {
        if !enrolled.contains(record.student.as_str()) {
            debug!(
                course = %course.id,
                student = %record.student,
                "ignoring marks for a student who is not enrolled"
            );
            continue;
        }
        grouped.entry(record.student.as_str()).or_default().push(record);
    }

    grouped
}

/// The scores that count for a tool: the original record, or an improvement
/// test targeting it when that scored higher over the tool's CO keys.
fn effective_scores<'a>(
    records: &[&'a MarksRecord],
    tool: &AssessmentTool,
    allocations: &[(CoId, f64)],
) -> Option<&'a BTreeMap<String, Score>> {
    let original = records
        .iter()
        .copied()
        .find(|record| !record.is_improvement() && record.assessment_name == tool.name);
    let improvement = records
        .iter()
        .copied()
        .find(|record| record.improves(&tool.name));

    let keys = || allocations.iter().map(|(co, _)| co.as_str());

    match (original, improvement) {
        (Some(original), Some(improvement)) => {
            if improvement.total_over(keys()) > original.total_over(keys()) {
                Some(&improvement.scores)
            } else {
                Some(&original.scores)
            }
        }
        (Some(original), None) => Some(&original.scores),
        (None, Some(improvement)) => Some(&improvement.scores),
        (None, None) => None,
    }
}

fn is_see_record(record: &MarksRecord, tool: &AssessmentTool) -> bool {
    if record.is_improvement() {
        return false;
    }
    let name = normalize_name(&record.assessment_name);
    name == normalize_name(&tool.name) || name == "see" || name == "semesterendexam"
}

fn see_attainment(
    tool: &AssessmentTool,
    roster: &[&StudentId],
    by_student: &BTreeMap<&str, Vec<&MarksRecord>>,
    rules: &Rules,
) -> SeeAttainment {
    let target = rules.target_for(tool.max_marks);
    let mut tally = Tally::default();

    for student in roster {
        let record = by_student
            .get(student.as_str())
            .and_then(|records| records.iter().find(|record| is_see_record(record, tool)));
        let Some(record) = record else {
            continue;
        };
        if record.scores.is_empty() || record.has_absence() {
            continue;
        }
        tally.record(record.total() >= target);
    }

    let percentage = tally.percentage();
    SeeAttainment {
        tool: tool.name.clone(),
        tally,
        percentage,
        level: rules.thresholds.classify(percentage),
    }
}
