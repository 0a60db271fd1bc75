use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

pub type CourseId = String;
pub type CoId = String;
pub type OutcomeId = String;
pub type StudentId = String;

/// CO id -> (outcome id -> correlation strength 1..=3).
pub type ArticulationMatrix = BTreeMap<CoId, BTreeMap<OutcomeId, u8>>;

/// A matrix cell as stored: a number, a numeric string, or `-` for no claim.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawCorrelation {
    Number(f64),
    Text(String),
}

fn parse_correlation(raw: RawCorrelation) -> Result<u8, String> {
    let value = match raw {
        RawCorrelation::Number(value) => value,
        RawCorrelation::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "-" {
                return Ok(0);
            }
            trimmed
                .parse::<f64>()
                .map_err(|_| format!("'{text}' is not a correlation"))?
        }
    };

    if value.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&value) {
        return Err(format!("correlation {value} is not a whole number"));
    }
    Ok(value as u8)
}

pub fn deserialize_matrix<'de, D>(deserializer: D) -> Result<ArticulationMatrix, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<CoId, BTreeMap<OutcomeId, RawCorrelation>>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(co, row)| -> Result<(CoId, BTreeMap<OutcomeId, u8>), String> {
            let row = row
                .into_iter()
                .map(|(outcome, cell)| parse_correlation(cell).map(|value| (outcome, value)))
                .collect::<Result<BTreeMap<_, _>, String>>()?;
            Ok((co, row))
        })
        .collect::<Result<ArticulationMatrix, String>>()
        .map_err(serde::de::Error::custom)
}

/// An articulation matrix decoded leniently from storage.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoredMatrix(#[serde(deserialize_with = "deserialize_matrix")] pub ArticulationMatrix);

pub fn deserialize_matrices<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<CourseId, ArticulationMatrix>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = BTreeMap::<CourseId, StoredMatrix>::deserialize(deserializer)?;
    Ok(stored
        .into_iter()
        .map(|(course, matrix)| (course, matrix.0))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub settings: SchemeSettings,
}

/// Scheme rule set as stored. Missing values are filled from
/// [`crate::config::EngineConfig`] when the rules are resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemeSettings {
    #[serde(default)]
    pub pass_criteria: Option<f64>,
    #[serde(default)]
    pub attainment_levels: Option<AttainmentLevels>,
    #[serde(default)]
    pub weightage: Option<Weightage>,
    #[serde(default, alias = "internal_split")]
    pub direct_split: Option<DirectSplit>,
    #[serde(default)]
    pub normalization_factor: Option<f64>,
    /// Nested spelling of the divisor; wins over the flat key when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub po_calculation: Option<PoCalculation>,
    #[serde(default)]
    pub indirect_tools: Vec<IndirectTool>,
}

impl SchemeSettings {
    pub fn normalization_divisor(&self) -> Option<f64> {
        self.po_calculation
            .and_then(|calculation| calculation.normalization_factor)
            .or(self.normalization_factor)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoCalculation {
    #[serde(default)]
    pub normalization_factor: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttainmentLevels {
    pub level_3: f64,
    pub level_2: f64,
    pub level_1: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weightage {
    pub direct: f64,
    pub indirect: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectSplit {
    pub cie: f64,
    pub see: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndirectTool {
    pub name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub credits: u32,
    #[serde(default)]
    pub semester: u32,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub cos: Vec<CourseOutcome>,
    #[serde(default, alias = "assessmentTools")]
    pub assessment_tools: Vec<AssessmentTool>,
    #[serde(default)]
    pub settings: CourseSettings,
}

impl Course {
    pub fn co_ids(&self) -> Vec<CoId> {
        self.cos.iter().map(|co| co.id.clone()).collect()
    }

    pub fn has_co(&self, co: &str) -> bool {
        self.cos.iter().any(|declared| declared.id == co)
    }

    /// The first semester end exam tool, if the course has one.
    pub fn see_tool(&self) -> Option<&AssessmentTool> {
        self.assessment_tools
            .iter()
            .find(|tool| tool.kind == ToolType::SemesterEndExam)
    }

    /// Tools whose marks feed the continuous internal evaluation tally.
    pub fn cie_tools(&self) -> impl Iterator<Item = &AssessmentTool> {
        self.assessment_tools
            .iter()
            .filter(|tool| tool.kind.counts_toward_cie())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseOutcome {
    pub id: CoId,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseSettings {
    /// Survey-derived rating per CO on the 0..=3 scale.
    #[serde(default, alias = "indirectAttainment")]
    pub indirect_attainment: BTreeMap<CoId, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolType {
    #[serde(
        rename = "Internal Assessment",
        alias = "InternalAssessment",
        alias = "CIE"
    )]
    InternalAssessment,
    #[serde(
        rename = "Semester End Exam",
        alias = "SemesterEndExam",
        alias = "SEE"
    )]
    SemesterEndExam,
    #[serde(rename = "Activity")]
    Activity,
    #[serde(rename = "Improvement Test", alias = "ImprovementTest")]
    ImprovementTest,
}

impl ToolType {
    pub fn counts_toward_cie(self) -> bool {
        matches!(self, ToolType::InternalAssessment)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentTool {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ToolType,
    #[serde(default, alias = "maxMarks")]
    pub max_marks: f64,
    #[serde(default, alias = "coDistribution")]
    pub co_distribution: BTreeMap<CoId, f64>,
}

impl AssessmentTool {
    /// Marks allocated per CO. A tool without a distribution counts toward
    /// every declared CO at its full max marks.
    pub fn allocations(&self, declared: &[CoId]) -> Vec<(CoId, f64)> {
        if self.co_distribution.is_empty() {
            if self.max_marks > 0.0 {
                return declared
                    .iter()
                    .map(|co| (co.clone(), self.max_marks))
                    .collect();
            }
            return Vec::new();
        }

        self.co_distribution
            .iter()
            .filter(|(_, max)| **max > 0.0)
            .map(|(co, max)| (co.clone(), *max))
            .collect()
    }
}

/// One obtained mark, or an absence marker such as `AB`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScore", into = "RawScore")]
pub enum Score {
    Marks(f64),
    Absent,
}

impl Score {
    pub fn marks(self) -> Option<f64> {
        match self {
            Score::Marks(value) => Some(value),
            Score::Absent => None,
        }
    }

    pub fn is_absent(self) -> bool {
        matches!(self, Score::Absent)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawScore {
    Number(f64),
    Text(String),
}

const ABSENCE_MARKERS: [&str; 5] = ["AB", "ABSENT", "A", "NA", "-"];

impl TryFrom<RawScore> for Score {
    type Error = String;

    fn try_from(value: RawScore) -> Result<Self, Self::Error> {
        match value {
            RawScore::Number(number) if number.is_finite() => Ok(Score::Marks(number)),
            RawScore::Number(number) => Err(format!("score {number} is not finite")),
            RawScore::Text(text) => {
                let trimmed = text.trim();
                let upper = trimmed.to_ascii_uppercase();
                if trimmed.is_empty() || ABSENCE_MARKERS.contains(&upper.as_str()) {
                    return Ok(Score::Absent);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|number| number.is_finite())
                    .map(Score::Marks)
                    .ok_or_else(|| format!("'{text}' is neither marks nor an absence marker"))
            }
        }
    }
}

impl From<Score> for RawScore {
    fn from(value: Score) -> Self {
        match value {
            Score::Marks(number) => RawScore::Number(number),
            Score::Absent => RawScore::Text("AB".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarksRecord {
    pub student: StudentId,
    pub course: CourseId,
    #[serde(alias = "assessment")]
    pub assessment_name: String,
    #[serde(default)]
    pub scores: BTreeMap<String, Score>,
    #[serde(default, alias = "improvementTarget")]
    pub improvement_test_for: Option<String>,
}

impl MarksRecord {
    pub fn is_improvement(&self) -> bool {
        self.improvement_test_for.is_some()
    }

    /// Sum of numeric marks over the given keys.
    pub fn total_over<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> f64 {
        keys.into_iter()
            .filter_map(|key| self.scores.get(key).and_then(|score| score.marks()))
            .sum()
    }

    /// Sum of every numeric mark in the record.
    pub fn total(&self) -> f64 {
        self.scores.values().filter_map(|score| score.marks()).sum()
    }

    pub fn has_absence(&self) -> bool {
        self.scores.values().any(|score| score.is_absent())
    }

    /// Whether this record improves on the named assessment.
    pub fn improves(&self, assessment: &str) -> bool {
        self.improvement_test_for
            .as_deref()
            .map(|target| normalize_name(target) == normalize_name(assessment))
            .unwrap_or(false)
    }
}

/// Lowercased alphanumeric form used to match assessment names loosely.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    Program,
    ProgramSpecific,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: OutcomeId,
    #[serde(default)]
    pub description: String,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        if self.id.trim().to_ascii_uppercase().starts_with("PSO") {
            OutcomeKind::ProgramSpecific
        } else {
            OutcomeKind::Program
        }
    }

    /// First run of digits in the id, 0 when there is none.
    pub fn number(&self) -> u32 {
        let digits: String = self
            .id
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().unwrap_or(0)
    }
}

/// Institution outcome catalogue: POs first, then PSOs, each by numeric suffix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeCatalogue {
    outcomes: Vec<Outcome>,
}

impl OutcomeCatalogue {
    pub fn new(mut outcomes: Vec<Outcome>) -> Self {
        outcomes.sort_by(|a, b| {
            (a.kind(), a.number(), &a.id).cmp(&(b.kind(), b.number(), &b.id))
        });
        outcomes.dedup_by(|a, b| a.id == b.id);
        Self { outcomes }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|outcome| outcome.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurveyInstrument {
    Exit,
    Employer,
    Alumni,
}

impl SurveyInstrument {
    pub const ALL: [SurveyInstrument; 3] = [
        SurveyInstrument::Exit,
        SurveyInstrument::Employer,
        SurveyInstrument::Alumni,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SurveyInstrument::Exit => "Program Exit Survey",
            SurveyInstrument::Employer => "Employer Survey",
            SurveyInstrument::Alumni => "Alumni Survey",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    #[serde(default)]
    pub department: String,
    #[serde(default, alias = "exitSurvey")]
    pub exit_survey: BTreeMap<OutcomeId, f64>,
    #[serde(default, alias = "employerSurvey")]
    pub employer_survey: BTreeMap<OutcomeId, f64>,
    #[serde(default, alias = "alumniSurvey")]
    pub alumni_survey: BTreeMap<OutcomeId, f64>,
}

impl SurveyRecord {
    pub fn instrument(&self, instrument: SurveyInstrument) -> &BTreeMap<OutcomeId, f64> {
        match instrument {
            SurveyInstrument::Exit => &self.exit_survey,
            SurveyInstrument::Employer => &self.employer_survey,
            SurveyInstrument::Alumni => &self.alumni_survey,
        }
    }

    /// Present, non-zero rating for the outcome from one instrument.
    pub fn rating(&self, instrument: SurveyInstrument, outcome: &str) -> Option<f64> {
        self.instrument(instrument)
            .get(outcome)
            .copied()
            .filter(|rating| rating.is_finite() && *rating != 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str) -> Outcome {
        Outcome {
            id: id.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn catalogue_orders_pos_before_psos_by_number() {
        let catalogue = OutcomeCatalogue::new(vec![
            outcome("PSO2"),
            outcome("PO10"),
            outcome("PSO1"),
            outcome("PO2"),
            outcome("PO1"),
        ]);
        let ids: Vec<&str> = catalogue.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["PO1", "PO2", "PO10", "PSO1", "PSO2"]);
    }

    #[test]
    fn scores_accept_numbers_strings_and_absence_markers() {
        let scores: BTreeMap<String, Score> =
            serde_json::from_str(r#"{"CO1": 12, "CO2": "7.5", "CO3": "ab", "CO4": "-"}"#)
                .expect("scores parse");
        assert_eq!(scores["CO1"], Score::Marks(12.0));
        assert_eq!(scores["CO2"], Score::Marks(7.5));
        assert_eq!(scores["CO3"], Score::Absent);
        assert_eq!(scores["CO4"], Score::Absent);
    }

    #[test]
    fn scores_reject_free_text() {
        let parsed: Result<BTreeMap<String, Score>, _> =
            serde_json::from_str(r#"{"CO1": "twelve"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn tool_types_accept_display_spellings() {
        let tool: AssessmentTool = serde_json::from_str(
            r#"{"name": "IA1", "type": "Internal Assessment", "maxMarks": 20, "coDistribution": {"CO1": 10}}"#,
        )
        .expect("tool parses");
        assert_eq!(tool.kind, ToolType::InternalAssessment);
        assert_eq!(tool.max_marks, 20.0);

        let see: ToolType = serde_json::from_str(r#""SEE""#).expect("alias parses");
        assert_eq!(see, ToolType::SemesterEndExam);
    }

    #[test]
    fn empty_distribution_spreads_max_marks_over_all_cos() {
        let tool = AssessmentTool {
            id: "T1".to_string(),
            name: "Quiz".to_string(),
            kind: ToolType::InternalAssessment,
            max_marks: 10.0,
            co_distribution: BTreeMap::new(),
        };
        let declared = vec!["CO1".to_string(), "CO2".to_string()];
        assert_eq!(
            tool.allocations(&declared),
            vec![("CO1".to_string(), 10.0), ("CO2".to_string(), 10.0)]
        );
    }

    #[test]
    fn improvement_target_matches_loosely() {
        let record = MarksRecord {
            student: "S1".to_string(),
            course: "C1".to_string(),
            assessment_name: "Improvement Test".to_string(),
            scores: BTreeMap::new(),
            improvement_test_for: Some("Internal Assessment-1".to_string()),
        };
        assert!(record.improves("internal assessment 1"));
        assert!(!record.improves("Internal Assessment 2"));
    }

    #[test]
    fn nested_normalization_factor_wins_over_flat_key() {
        let settings: SchemeSettings = serde_json::from_str(
            r#"{"normalization_factor": 3, "po_calculation": {"normalization_factor": 2}}"#,
        )
        .expect("settings parse");
        assert_eq!(settings.normalization_divisor(), Some(2.0));

        let nested_only: SchemeSettings =
            serde_json::from_str(r#"{"po_calculation": {"normalization_factor": 2.5}}"#)
                .expect("settings parse");
        assert_eq!(nested_only.normalization_divisor(), Some(2.5));

        let flat: SchemeSettings =
            serde_json::from_str(r#"{"normalization_factor": 4}"#).expect("settings parse");
        assert_eq!(flat.normalization_divisor(), Some(4.0));
    }

    #[test]
    fn matrix_cells_accept_dashes_and_numeric_strings() {
        let matrix: StoredMatrix = serde_json::from_str(
            r#"{"CO1": {"PO1": 3, "PO2": "2", "PO3": "-", "PSO1": ""}}"#,
        )
        .expect("matrix parses");
        let row = &matrix.0["CO1"];
        assert_eq!(row["PO1"], 3);
        assert_eq!(row["PO2"], 2);
        assert_eq!(row["PO3"], 0);
        assert_eq!(row["PSO1"], 0);

        let fractional: Result<StoredMatrix, _> = serde_json::from_str(r#"{"CO1": {"PO1": 1.5}}"#);
        assert!(fractional.is_err());
        let text: Result<StoredMatrix, _> = serde_json::from_str(r#"{"CO1": {"PO1": "high"}}"#);
        assert!(text.is_err());
    }

    #[test]
    fn survey_rating_treats_zero_as_missing() {
        let mut survey = SurveyRecord::default();
        survey.exit_survey.insert("PO1".to_string(), 2.0);
        survey.employer_survey.insert("PO1".to_string(), 0.0);
        assert_eq!(survey.rating(SurveyInstrument::Exit, "PO1"), Some(2.0));
        assert_eq!(survey.rating(SurveyInstrument::Employer, "PO1"), None);
        assert_eq!(survey.rating(SurveyInstrument::Alumni, "PO1"), None);
    }
}
