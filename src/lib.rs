//! Outcome attainment engine for outcome-based education programs.
//!
//! Raw assessment marks become CO attainment levels, are blended with survey
//! evidence, propagated through each course's articulation matrix and
//! aggregated into program-level PO/PSO attainment.

pub mod articulation;
pub mod blend;
pub mod bundle;
pub mod config;
pub mod direct;
pub mod engine;
pub mod error;
pub mod improvement;
pub mod models;
pub mod program;
pub mod propagate;
pub mod report;
pub mod rules;
pub mod student;
pub mod threshold;

pub use bundle::{CourseInput, DepartmentBundle};
pub use config::EngineConfig;
pub use engine::{AttainmentEngine, CourseReport, ProgramReport};
pub use error::{ConfigError, EngineError, EngineResult};
