use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Args};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use obe_attainment::DepartmentBundle;

use crate::db;

/// Where a command reads its department snapshot from.
#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("source")
        .args(["bundle", "department"])
        .required(true)
        .multiple(false)
))]
pub struct SourceArgs {
    /// JSON department bundle on disk
    #[arg(long)]
    pub bundle: Option<PathBuf>,
    /// Department id to load from Postgres (requires DATABASE_URL)
    #[arg(long)]
    pub department: Option<String>,
}

pub async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

pub fn load_bundle_file(path: &Path) -> anyhow::Result<DepartmentBundle> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bundle {}", path.display()))?;
    let bundle = DepartmentBundle::from_json(&raw)
        .with_context(|| format!("failed to parse bundle {}", path.display()))?;
    info!(
        path = %path.display(),
        department = %bundle.department,
        courses = bundle.courses.len(),
        "loaded bundle file"
    );
    Ok(bundle)
}

impl SourceArgs {
    pub async fn load(&self) -> anyhow::Result<DepartmentBundle> {
        match (&self.bundle, &self.department) {
            (Some(path), _) => load_bundle_file(path),
            (None, Some(department)) => {
                let pool = connect().await?;
                db::load_bundle(&pool, department)
                    .await
                    .with_context(|| format!("failed to load department {department}"))
            }
            (None, None) => anyhow::bail!("either --bundle or --department is required"),
        }
    }
}
