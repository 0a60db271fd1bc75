use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::{AssessmentTool, CoId, Course, CourseId, MarksRecord, Score, StudentId, ToolType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoMark {
    pub co: CoId,
    /// `None` when the tool allocates nothing to this CO.
    pub allocated: Option<f64>,
    pub obtained: Option<Score>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolScore {
    pub tool: String,
    pub kind: ToolType,
    pub obtained: f64,
    pub max_marks: f64,
    pub percentage: f64,
    /// Improvement test score targeting this tool, shown alongside the original.
    pub improvement: Option<f64>,
    pub breakdown: Vec<CoMark>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentReport {
    pub student: StudentId,
    pub course: CourseId,
    pub tools: Vec<ToolScore>,
    pub total_obtained: f64,
    pub total_max: f64,
    pub overall_percentage: f64,
}

fn percentage(obtained: f64, max: f64) -> f64 {
    if max > 0.0 {
        obtained / max * 100.0
    } else {
        0.0
    }
}

fn tool_total(record: &MarksRecord, tool: &AssessmentTool) -> f64 {
    match tool.kind {
        ToolType::SemesterEndExam | ToolType::Activity => record.total(),
        _ if tool.co_distribution.is_empty() => record.total(),
        _ => record.total_over(tool.co_distribution.keys().map(String::as_str)),
    }
}

/// Marks card for one student in one course.
pub fn student_report(course: &Course, student: &str, marks: &[MarksRecord]) -> StudentReport {
    let records: Vec<&MarksRecord> = marks
        .iter()
        .filter(|record| record.course == course.id && record.student == student)
        .collect();

    let mut seen = BTreeSet::new();
    let tools: Vec<ToolScore> = course
        .assessment_tools
        .iter()
        .filter(|tool| seen.insert(tool.name.as_str()))
        .filter(|tool| tool.kind != ToolType::ImprovementTest)
        .map(|tool| {
            let record = records
                .iter()
                .copied()
                .find(|record| !record.is_improvement() && record.assessment_name == tool.name);
            let improvement = records
                .iter()
                .copied()
                .find(|record| record.improves(&tool.name))
                .map(|record| tool_total(record, tool));
            let obtained = record.map(|record| tool_total(record, tool)).unwrap_or(0.0);

            let breakdown = course
                .cos
                .iter()
                .map(|co| CoMark {
                    co: co.id.clone(),
                    allocated: tool.co_distribution.get(&co.id).copied(),
                    obtained: record.and_then(|record| record.scores.get(&co.id).copied()),
                })
                .collect();

            ToolScore {
                tool: tool.name.clone(),
                kind: tool.kind,
                obtained,
                max_marks: tool.max_marks,
                percentage: percentage(obtained, tool.max_marks),
                improvement,
                breakdown,
            }
        })
        .collect();

    let total_obtained: f64 = tools.iter().map(|tool| tool.obtained).sum();
    let total_max: f64 = tools.iter().map(|tool| tool.max_marks).sum();

    StudentReport {
        student: student.to_string(),
        course: course.id.clone(),
        overall_percentage: percentage(total_obtained, total_max),
        tools,
        total_obtained,
        total_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseOutcome, CourseSettings};

    fn tool(name: &str, kind: ToolType, max: f64, dist: &[(&str, f64)]) -> AssessmentTool {
        AssessmentTool {
            id: name.to_string(),
            name: name.to_string(),
            kind,
            max_marks: max,
            co_distribution: dist.iter().map(|(co, m)| (co.to_string(), *m)).collect(),
        }
    }

    fn record(assessment: &str, scores: &[(&str, Score)], target: Option<&str>) -> MarksRecord {
        MarksRecord {
            student: "S1".to_string(),
            course: "C1".to_string(),
            assessment_name: assessment.to_string(),
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            improvement_test_for: target.map(str::to_string),
        }
    }

    fn course() -> Course {
        Course {
            id: "C1".to_string(),
            code: "CS101".to_string(),
            name: String::new(),
            credits: 4,
            semester: 1,
            scheme: None,
            cos: ["CO1", "CO2"]
                .iter()
                .map(|id| CourseOutcome {
                    id: id.to_string(),
                    description: String::new(),
                })
                .collect(),
            assessment_tools: vec![
                tool("IA1", ToolType::InternalAssessment, 20.0, &[("CO1", 10.0), ("CO2", 10.0)]),
                tool("IA1", ToolType::InternalAssessment, 50.0, &[]),
                tool("Seminar", ToolType::Activity, 10.0, &[]),
                tool("SEE", ToolType::SemesterEndExam, 100.0, &[]),
                tool("Improvement Test", ToolType::ImprovementTest, 20.0, &[]),
            ],
            settings: CourseSettings::default(),
        }
    }

    #[test]
    fn sums_marks_per_tool_and_overall() {
        let marks = vec![
            record("IA1", &[("CO1", Score::Marks(8.0)), ("CO2", Score::Absent)], None),
            record("Seminar", &[("Score", Score::Marks(9.0))], None),
            record("SEE", &[("External", Score::Marks(63.0))], None),
            record("Improvement Test", &[("CO1", Score::Marks(9.0)), ("CO2", Score::Marks(7.0))], Some("IA1")),
        ];
        let report = student_report(&course(), "S1", &marks);

        let names: Vec<&str> = report.tools.iter().map(|tool| tool.tool.as_str()).collect();
        assert_eq!(names, vec!["IA1", "Seminar", "SEE"]);
        assert_eq!(report.tools[0].obtained, 8.0);
        assert_eq!(report.tools[0].improvement, Some(16.0));
        assert_eq!(report.tools[0].breakdown[1].obtained, Some(Score::Absent));
        assert_eq!(report.total_obtained, 80.0);
        assert_eq!(report.total_max, 130.0);
        assert!((report.overall_percentage - 80.0 / 130.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn missing_records_score_zero() {
        let report = student_report(&course(), "S1", &[]);
        assert!(report.tools.iter().all(|tool| tool.obtained == 0.0));
        assert_eq!(report.overall_percentage, 0.0);
    }
}
