use thiserror::Error;

/// A single malformed configuration value, named by the field it came from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("threshold table is empty")]
    EmptyThresholds,

    #[error("threshold table must end with a 0 threshold mapping to level 0")]
    MissingCatchAll,

    #[error("threshold {threshold} at position {index} is not in descending order")]
    UnorderedThresholds { index: usize, threshold: f64 },

    #[error("threshold {0} must be a finite, non-negative percentage")]
    InvalidThreshold(f64),

    #[error("attainment level {0} is outside 0..=3")]
    LevelOutOfRange(u8),

    #[error("{field} weights sum to {sum}, expected 100")]
    WeightSum { field: &'static str, sum: f64 },

    #[error("{field} weight {value} must be a finite, non-negative number")]
    InvalidWeight { field: &'static str, value: f64 },

    #[error("pass criteria {0} must be within 0..=100")]
    PassCriteria(f64),

    #[error("normalization factor {0} must be greater than zero")]
    NormalizationFactor(f64),

    #[error("{context} references unknown course outcome {co}")]
    UnknownCo { co: String, context: String },

    #[error("{context} references unknown outcome {outcome}")]
    UnknownOutcome { outcome: String, context: String },

    #[error("correlation {value} for {co} -> {outcome} is outside 1..=3")]
    Correlation {
        co: String,
        outcome: String,
        value: u8,
    },

    #[error("indirect rating {value} for {co} is outside 0..=3")]
    IndirectRating { co: String, value: f64 },

    #[error("{instrument} rating {value} for {outcome} is outside 0..=3")]
    SurveyRating {
        instrument: &'static str,
        outcome: String,
        value: f64,
    },

    #[error("assessment tool {tool} has invalid max marks {value}")]
    MaxMarks { tool: String, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("course {course}: invalid {field}: {source}")]
    Course {
        course: String,
        field: &'static str,
        #[source]
        source: ConfigError,
    },

    #[error("scheme {scheme}: invalid {field}: {source}")]
    Scheme {
        scheme: String,
        field: &'static str,
        #[source]
        source: ConfigError,
    },

    #[error("course {course} references scheme {scheme}, which was not supplied")]
    MissingScheme { course: String, scheme: String },

    #[error("survey for department {department}: {source}")]
    Survey {
        department: String,
        #[source]
        source: ConfigError,
    },

    #[error("reference scheme {0} was not supplied")]
    UnknownReferenceScheme(String),

    #[error("course {0} was not supplied")]
    UnknownCourse(String),

    #[error(
        "marks for student {student} in course {course} ({assessment}) use unknown key {key}"
    )]
    UnknownScoreKey {
        student: String,
        course: String,
        assessment: String,
        key: String,
    },

    #[error("duplicate marks for student {student} in course {course} ({assessment})")]
    DuplicateMarks {
        student: String,
        course: String,
        assessment: String,
    },
}

impl EngineError {
    pub(crate) fn course(course: &str, field: &'static str, source: ConfigError) -> Self {
        Self::Course {
            course: course.to_string(),
            field,
            source,
        }
    }

    pub(crate) fn scheme(scheme: &str, field: &'static str, source: ConfigError) -> Self {
        Self::Scheme {
            scheme: scheme.to_string(),
            field,
            source,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
