use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::engine::{CourseReport, ProgramReport};
use crate::student::StudentReport;

fn value(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

fn level(level: Option<u8>) -> String {
    level
        .map(|level| level.to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn write_course_section(output: &mut String, course: &CourseReport) {
    let _ = writeln!(
        output,
        "### {} {} (semester {}, {})",
        course.code, course.name, course.semester, course.scheme
    );

    if course.enrolled == 0 {
        let _ = writeln!(output, "No enrolled students; CO attainment has no data.");
    }

    match &course.see {
        Some(see) => {
            let _ = writeln!(
                output,
                "SEE ({}): {}/{} met target ({:.1}%), level {}",
                see.tool, see.tally.passed, see.tally.attempts, see.percentage, see.level
            );
        }
        None => {
            let _ = writeln!(output, "No semester end exam configured; SEE level counts as 0.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "| CO | CIE | SEE | Direct | Indirect | Score index |");
    let _ = writeln!(output, "|----|-----|-----|--------|----------|-------------|");
    for co in &course.co {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {:.2} | {} |",
            co.co,
            level(co.cie_level),
            level(co.see_level),
            value(co.direct),
            co.indirect,
            value(co.score_index)
        );
    }

    let _ = writeln!(output);
    if course.po_attainment.is_empty() {
        let _ = writeln!(output, "No outcomes claimed by this course.");
    } else {
        for outcome in &course.po_attainment {
            let _ = writeln!(
                output,
                "- {}: {:.2} ({:.1}%) from {} CO(s)",
                outcome.outcome, outcome.attained, outcome.percentage, outcome.contributing_cos
            );
        }
    }

    if !course.unmapped_cos.is_empty() {
        let _ = writeln!(
            output,
            "- Unmapped COs: {}",
            course.unmapped_cos.join(", ")
        );
    }
    let _ = writeln!(output);
}

pub fn build_report(report: &ProgramReport, generated_at: DateTime<Utc>) -> String {
    let mut output = String::new();
    let program = &report.program;

    let _ = writeln!(output, "# Outcome Attainment Report");
    let _ = writeln!(
        output,
        "Generated for {} on {} (reference scheme {}, direct {:.0}% / indirect {:.0}%)",
        report.department,
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        program.reference_scheme,
        program.weightage.primary * 100.0,
        program.weightage.secondary * 100.0
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Program Attainment");

    if program.rows.is_empty() {
        let _ = writeln!(output, "No outcomes defined for this department.");
    } else {
        let _ = writeln!(
            output,
            "| Outcome | Direct | Exit | Employer | Alumni | Indirect | Total |"
        );
        let _ = writeln!(
            output,
            "|---------|--------|------|----------|--------|----------|-------|"
        );
        for row in &program.rows {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {:.2} | {:.2} |",
                row.outcome,
                value(row.direct),
                value(row.exit_survey),
                value(row.employer_survey),
                value(row.alumni_survey),
                row.indirect,
                row.total
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Improvement Actions");
    let low = &report.low_attainment;

    if low.is_clear() {
        let _ = writeln!(
            output,
            "All measured outcomes reached the target attainment level of {:.1}.",
            low.threshold
        );
    } else {
        for flagged in &low.flagged {
            let _ = writeln!(
                output,
                "- {} attained {:.2} (target {:.1}, gap {:.2}): {}",
                flagged.outcome,
                flagged.attained,
                low.threshold,
                flagged.gap,
                flagged.suggestions.join(" ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Attainment");

    if report.courses.is_empty() {
        let _ = writeln!(output, "No courses recorded for this department.");
    } else {
        for course in &report.courses {
            write_course_section(&mut output, course);
        }
    }

    output
}

pub fn build_student_report(report: &StudentReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Student {} in course {}",
        report.student, report.course
    );
    for tool in &report.tools {
        let improvement = tool
            .improvement
            .map(|score| format!(" (improvement test {score:.1})"))
            .unwrap_or_default();
        let _ = writeln!(
            output,
            "- {}: {:.1}/{:.1} ({:.1}%){}",
            tool.tool, tool.obtained, tool.max_marks, tool.percentage, improvement
        );
    }
    let _ = writeln!(
        output,
        "Overall: {:.1}/{:.1} ({:.2}%)",
        report.total_obtained, report.total_max, report.overall_percentage
    );

    output
}
