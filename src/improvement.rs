use serde::Serialize;

use crate::models::OutcomeId;
use crate::program::ProgramAttainment;

const GENERIC_ACTIONS: [&str; 2] = ["Review curriculum gaps.", "Consult academic experts."];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedOutcome {
    pub outcome: OutcomeId,
    pub description: String,
    pub attained: f64,
    pub gap: f64,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowAttainmentReport {
    pub threshold: f64,
    pub flagged: Vec<FlaggedOutcome>,
}

impl LowAttainmentReport {
    pub fn is_clear(&self) -> bool {
        self.flagged.is_empty()
    }
}

/// Whether a total needs remediation. A total of exactly 0 means no
/// evidence yet and is never flagged.
pub fn needs_improvement(total: f64, threshold: f64) -> bool {
    total > 0.0 && total < threshold
}

pub fn detect_low_attainment(program: &ProgramAttainment, threshold: f64) -> LowAttainmentReport {
    let flagged = program
        .rows
        .iter()
        .filter(|row| needs_improvement(row.total, threshold))
        .map(|row| FlaggedOutcome {
            outcome: row.outcome.clone(),
            description: row.description.clone(),
            attained: row.total,
            gap: threshold - row.total,
            suggestions: suggested_actions(&row.outcome)
                .iter()
                .map(|action| action.to_string())
                .collect(),
        })
        .collect();

    LowAttainmentReport { threshold, flagged }
}

/// Remediation actions for an outcome, with a generic fallback.
pub fn suggested_actions(outcome: &str) -> &'static [&'static str] {
    match outcome.trim().to_ascii_uppercase().as_str() {
        "PO1" => &[
            "Conduct remedial classes on fundamental engineering concepts.",
            "Introduce technical quizzes to reinforce basic knowledge.",
        ],
        "PO2" => &[
            "Increase problem-solving sessions during tutorials.",
            "Assign complex case studies requiring analytical thinking.",
        ],
        "PO3" => &[
            "Include more design-oriented projects in the curriculum.",
            "Organize workshops on system design and development.",
        ],
        "PO4" => &[
            "Encourage participation in research-based projects.",
            "Introduce mini-projects requiring data analysis and interpretation.",
        ],
        "PO5" => &[
            "Integrate modern tools (e.g., MATLAB, CAD) into lab sessions.",
            "Conduct training sessions on industry-standard software.",
        ],
        "PO6" => &[
            "Organize guest lectures on the role of engineers in society.",
            "Include social impact analysis in project reports.",
        ],
        "PO7" => &[
            "Promote projects focused on sustainability and environment.",
            "Introduce modules on green technology.",
        ],
        "PO8" => &[
            "Conduct workshops on professional ethics and cyber laws.",
            "Include case studies on ethical dilemmas in engineering.",
        ],
        "PO9" => &[
            "Assign group projects to enhance team dynamics.",
            "Encourage participation in team-based hackathons.",
        ],
        "PO10" => &[
            "Organize soft skills training and presentation sessions.",
            "Mandate technical report writing for all major projects.",
        ],
        "PO11" => &[
            "Introduce basics of project management and finance in projects.",
            "Encourage students to plan project budgets and timelines.",
        ],
        "PO12" => &[
            "Encourage usage of MOOCs (NPTEL, Coursera) for self-learning.",
            "Promote membership in professional bodies like IEEE/ACM.",
        ],
        "PSO1" => &[
            "Strengthen coding bootcamps and algorithmic problem solving.",
            "Host hackathons focused on domain-specific challenges.",
        ],
        "PSO2" => &[
            "Facilitate internships with core industry partners.",
            "Focus on end-to-end software development lifecycles in projects.",
        ],
        _ => &GENERIC_ACTIONS,
    }
}
