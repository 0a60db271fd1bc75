use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use obe_attainment::report;
use obe_attainment::student::student_report;
use obe_attainment::{AttainmentEngine, EngineConfig};

mod db;
mod source;

use source::SourceArgs;

#[derive(Parser)]
#[command(name = "obe-attainment")]
#[command(about = "Course and program outcome attainment for outcome-based education", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a realistic department into Postgres
    Seed,
    /// Check a department snapshot without printing results
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// CO scores and outcome attainment for one course
    Course {
        #[command(flatten)]
        source: SourceArgs,
        /// Course id or code
        #[arg(long)]
        course: String,
        #[arg(long)]
        json: bool,
    },
    /// Program-level PO/PSO attainment summary
    Program {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        reference_scheme: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Outcomes below the target attainment with suggested actions
    Improvements {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        reference_scheme: Option<String>,
        /// Override the improvement threshold
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Average CO correlation per course and outcome, grouped by semester
    Matrix {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Marks card for one student in one course
    Student {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        course: String,
        #[arg(long)]
        student: String,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown attainment report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        reference_scheme: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn ensure_threshold(threshold: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        threshold.is_finite() && threshold > 0.0,
        "--threshold must be a finite number greater than zero, got {threshold}"
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = source::connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = source::connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Validate { source } => {
            let bundle = source.load().await?;
            let report = AttainmentEngine::default()
                .program_report(&bundle, None)
                .context("department snapshot is invalid")?;
            println!(
                "Department {} is valid: {} courses, {} marks records, {} outcomes.",
                report.department,
                report.courses.len(),
                bundle.marks.len(),
                report.program.rows.len()
            );
        }
        Commands::Course {
            source,
            course,
            json,
        } => {
            let bundle = source.load().await?;
            let course = bundle.require_course(&course)?;
            let report = AttainmentEngine::default()
                .course_report(&bundle.course_input(course), &bundle.catalogue())?;

            if json {
                return print_json(&report);
            }

            let mut output = String::new();
            report::write_course_section(&mut output, &report);
            print!("{output}");
        }
        Commands::Program {
            source,
            reference_scheme,
            json,
        } => {
            let bundle = source.load().await?;
            let report =
                AttainmentEngine::default().program_report(&bundle, reference_scheme.as_deref())?;

            if json {
                return print_json(&report.program);
            }

            if report.program.rows.is_empty() {
                println!("No outcomes defined for department {}.", report.department);
                return Ok(());
            }

            println!(
                "Program attainment for {} (reference scheme {}):",
                report.department, report.program.reference_scheme
            );
            for row in &report.program.rows {
                let direct = row
                    .direct
                    .map(|value| format!("{value:.2}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "- {} direct {} indirect {:.2} total {:.2}",
                    row.outcome, direct, row.indirect, row.total
                );
            }
        }
        Commands::Improvements {
            source,
            reference_scheme,
            threshold,
            json,
        } => {
            let bundle = source.load().await?;
            let mut config = EngineConfig::default();
            if let Some(threshold) = threshold {
                ensure_threshold(threshold)?;
                config.improvement_threshold = threshold;
            }
            let report =
                AttainmentEngine::new(config).program_report(&bundle, reference_scheme.as_deref())?;
            let low = &report.low_attainment;

            if json {
                return print_json(low);
            }

            if low.is_clear() {
                println!(
                    "No outcomes below the target attainment of {:.1}.",
                    low.threshold
                );
                return Ok(());
            }

            for flagged in &low.flagged {
                println!(
                    "{} attained {:.2} (gap {:.2})",
                    flagged.outcome, flagged.attained, flagged.gap
                );
                for suggestion in &flagged.suggestions {
                    println!("  - {suggestion}");
                }
            }
        }
        Commands::Matrix { source, json } => {
            let bundle = source.load().await?;
            let report = AttainmentEngine::default().program_report(&bundle, None)?;

            if json {
                return print_json(&report.matrix);
            }

            for semester in &report.matrix {
                println!("Semester {}:", semester.semester);
                for course in &semester.courses {
                    let averages: Vec<String> = course
                        .averages
                        .iter()
                        .map(|entry| format!("{} {:.2}", entry.outcome, entry.average))
                        .collect();
                    let averages = if averages.is_empty() {
                        "no mapped outcomes".to_string()
                    } else {
                        averages.join(", ")
                    };
                    println!("- {} {}: {}", course.code, course.name, averages);
                }
            }
        }
        Commands::Student {
            source,
            course,
            student,
            json,
        } => {
            let bundle = source.load().await?;
            let course = bundle.require_course(&course)?;
            let report = student_report(course, &student, &bundle.marks);

            if json {
                return print_json(&report);
            }

            print!("{}", report::build_student_report(&report));
        }
        Commands::Report {
            source,
            reference_scheme,
            out,
        } => {
            let bundle = source.load().await?;
            let report =
                AttainmentEngine::default().program_report(&bundle, reference_scheme.as_deref())?;
            let rendered = report::build_report(&report, Utc::now());
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
