use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use obe_attainment::models::{
    AssessmentTool, Course, CourseOutcome, CourseSettings, MarksRecord, Outcome, Scheme,
    SchemeSettings, Score, StoredMatrix, SurveyRecord,
};
use obe_attainment::DepartmentBundle;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn default_settings() -> Value {
    json!({
        "pass_criteria": 50,
        "attainment_levels": { "level_3": 70, "level_2": 60, "level_1": 50 },
        "weightage": { "direct": 80, "indirect": 20 },
        "direct_split": { "cie": 50, "see": 50 },
        "normalization_factor": 3,
        "indirect_tools": [{ "name": "Course Exit Survey", "weight": 100 }]
    })
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO obe_attainment.departments (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind("CSE")
    .bind("Computer Science and Engineering")
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO obe_attainment.schemes (id, name, settings)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, settings = EXCLUDED.settings
        "#,
    )
    .bind("SCHEME2022")
    .bind("2022 Outcome Based Education Scheme")
    .bind(Json(default_settings()))
    .execute(pool)
    .await?;

    let configuration = vec![
        ("global_scheme_settings", default_settings()),
        ("reference_scheme", json!("SCHEME2022")),
    ];
    for (key, value) in configuration {
        sqlx::query(
            r#"
            INSERT INTO obe_attainment.configuration (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(Json(value))
        .execute(pool)
        .await?;
    }

    let outcomes = vec![
        ("PO1", "Engineering knowledge", None),
        ("PO2", "Problem analysis", None),
        ("PO3", "Design and development of solutions", None),
        ("PO4", "Investigation of complex problems", None),
        ("PO5", "Modern tool usage", None),
        ("PO6", "The engineer and society", None),
        ("PO7", "Environment and sustainability", None),
        ("PO8", "Ethics", None),
        ("PO9", "Individual and team work", None),
        ("PO10", "Communication", None),
        ("PO11", "Project management and finance", None),
        ("PO12", "Life-long learning", None),
        ("PSO1", "Design efficient software using algorithms and data structures", Some("CSE")),
        ("PSO2", "Build and maintain data-intensive applications", Some("CSE")),
    ];
    for (id, description, department) in outcomes {
        sqlx::query(
            r#"
            INSERT INTO obe_attainment.outcomes (id, description, department_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET description = EXCLUDED.description, department_id = EXCLUDED.department_id
            "#,
        )
        .bind(id)
        .bind(description)
        .bind(department)
        .execute(pool)
        .await?;
    }

    let cos = json!([
        { "id": "CO1", "description": "Apply linear data organisation to practical problems" },
        { "id": "CO2", "description": "Analyse hierarchical and indexed structures" },
        { "id": "CO3", "description": "Design solutions combining multiple structures" }
    ]);
    let tools = json!([
        { "id": "T1", "name": "Internal Assessment 1", "type": "Internal Assessment", "maxMarks": 30,
          "coDistribution": { "CO1": 15, "CO2": 15 } },
        { "id": "T2", "name": "Internal Assessment 2", "type": "Internal Assessment", "maxMarks": 30,
          "coDistribution": { "CO2": 10, "CO3": 20 } },
        { "id": "T3", "name": "Seminar", "type": "Activity", "maxMarks": 10 },
        { "id": "T4", "name": "Semester End Exam", "type": "Semester End Exam", "maxMarks": 100 },
        { "id": "T5", "name": "Improvement Test", "type": "Improvement Test", "maxMarks": 30,
          "coDistribution": { "CO1": 15, "CO2": 15 } }
    ]);
    let courses = vec![
        ("C101", "CS201", "Data Structures", 3, 4, json!({ "CO1": 2.5, "CO2": 3, "CO3": 2 })),
        ("C102", "CS202", "Database Systems", 4, 4, json!({ "CO1": 3, "CO2": 2.5 })),
    ];
    for (id, code, name, semester, credits, indirect) in courses {
        sqlx::query(
            r#"
            INSERT INTO obe_attainment.courses
            (id, code, name, semester, credits, department_id, scheme_id, cos, assessment_tools, settings)
            VALUES ($1, $2, $3, $4, $5, 'CSE', 'SCHEME2022', $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET code = EXCLUDED.code, name = EXCLUDED.name, cos = EXCLUDED.cos,
                assessment_tools = EXCLUDED.assessment_tools, settings = EXCLUDED.settings
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(name)
        .bind(semester)
        .bind(credits)
        .bind(Json(&cos))
        .bind(Json(&tools))
        .bind(Json(json!({ "indirect_attainment": indirect })))
        .execute(pool)
        .await?;
    }

    let students = vec![
        ("S01", "Avery Rao", "1XX22CS001"),
        ("S02", "Jules Menon", "1XX22CS002"),
        ("S03", "Kiara Shetty", "1XX22CS003"),
        ("S04", "Dev Kulkarni", "1XX22CS004"),
    ];
    for (id, name, usn) in &students {
        sqlx::query(
            r#"
            INSERT INTO obe_attainment.students (id, name, usn)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, usn = EXCLUDED.usn
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(usn)
        .execute(pool)
        .await?;

        for course in ["C101", "C102"] {
            sqlx::query(
                r#"
                INSERT INTO obe_attainment.enrollments (course_id, student_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(course)
            .bind(id)
            .execute(pool)
            .await?;
        }
    }

    let marks: Vec<(&str, &str, &str, Value, Option<&str>)> = vec![
        ("S01", "C101", "Internal Assessment 1", json!({ "CO1": 12, "CO2": 11 }), None),
        ("S01", "C101", "Internal Assessment 2", json!({ "CO2": 8, "CO3": 15 }), None),
        ("S01", "C101", "Seminar", json!({ "Score": 9 }), None),
        ("S01", "C101", "Semester End Exam", json!({ "External": 68 }), None),
        ("S02", "C101", "Internal Assessment 1", json!({ "CO1": 6, "CO2": "AB" }), None),
        ("S02", "C101", "Internal Assessment 2", json!({ "CO2": 6, "CO3": 12 }), None),
        ("S02", "C101", "Improvement Test", json!({ "CO1": 11, "CO2": 9 }), Some("Internal Assessment 1")),
        ("S02", "C101", "Semester End Exam", json!({ "External": 52 }), None),
        ("S03", "C101", "Internal Assessment 1", json!({ "CO1": 14, "CO2": 13 }), None),
        ("S03", "C101", "Internal Assessment 2", json!({ "CO2": 9, "CO3": 18 }), None),
        ("S03", "C101", "Semester End Exam", json!({ "External": 81 }), None),
        ("S04", "C101", "Internal Assessment 1", json!({ "CO1": 5, "CO2": 7 }), None),
        ("S04", "C101", "Internal Assessment 2", json!({ "CO2": 3, "CO3": 8 }), None),
        ("S04", "C101", "Semester End Exam", json!({ "External": "AB" }), None),
        ("S01", "C102", "Internal Assessment 1", json!({ "CO1": 10, "CO2": 9 }), None),
        ("S01", "C102", "Semester End Exam", json!({ "External": 47 }), None),
        ("S02", "C102", "Internal Assessment 1", json!({ "CO1": 13, "CO2": 12 }), None),
        ("S02", "C102", "Semester End Exam", json!({ "External": 61 }), None),
        ("S03", "C102", "Internal Assessment 1", json!({ "CO1": 7, "CO2": 6 }), None),
        ("S03", "C102", "Semester End Exam", json!({ "External": 39 }), None),
        ("S04", "C102", "Internal Assessment 1", json!({ "CO1": 9, "CO2": 11 }), None),
        ("S04", "C102", "Semester End Exam", json!({ "External": 55 }), None),
    ];
    for (student, course, assessment, scores, improvement_for) in marks {
        sqlx::query(
            r#"
            INSERT INTO obe_attainment.marks
            (id, student_id, course_id, assessment_name, scores, improvement_test_for)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (student_id, course_id, assessment_name) DO UPDATE
            SET scores = EXCLUDED.scores, improvement_test_for = EXCLUDED.improvement_test_for
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(course)
        .bind(assessment)
        .bind(Json(scores))
        .bind(improvement_for)
        .execute(pool)
        .await?;
    }

    let matrices = vec![
        (
            "C101",
            json!({
                "CO1": { "PO1": 3, "PO2": 2 },
                "CO2": { "PO2": 3, "PO3": 1, "PSO1": 2 },
                "CO3": { "PO3": 2, "PSO1": 3 }
            }),
        ),
        (
            "C102",
            json!({
                "CO1": { "PO1": 2, "PO5": 3 },
                "CO2": { "PO2": 2, "PSO2": 3 },
                "CO3": { "PO5": 2, "PSO2": 2 }
            }),
        ),
    ];
    for (course, matrix) in matrices {
        sqlx::query(
            r#"
            INSERT INTO obe_attainment.articulation_matrix (course_id, matrix)
            VALUES ($1, $2)
            ON CONFLICT (course_id) DO UPDATE SET matrix = EXCLUDED.matrix
            "#,
        )
        .bind(course)
        .bind(Json(matrix))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO obe_attainment.surveys
        (department_id, exit_survey, employer_survey, alumni_survey, updated_at)
        VALUES ($1, $2, $3, $4, now())
        ON CONFLICT (department_id) DO UPDATE
        SET exit_survey = EXCLUDED.exit_survey,
            employer_survey = EXCLUDED.employer_survey,
            alumni_survey = EXCLUDED.alumni_survey,
            updated_at = now()
        "#,
    )
    .bind("CSE")
    .bind(Json(json!({ "PO1": 2.6, "PO2": 2.4, "PO3": 2.1, "PO5": 2.8, "PSO1": 2.5, "PSO2": 2.2 })))
    .bind(Json(json!({ "PO1": 2.2, "PO2": 2.0, "PO5": 2.5, "PSO2": 2.4 })))
    .bind(Json(json!({ "PO1": 2.8, "PO3": 2.3, "PSO1": 2.7 })))
    .execute(pool)
    .await?;

    Ok(())
}

/// Assembles the immutable input snapshot for one department.
pub async fn load_bundle(pool: &PgPool, department: &str) -> anyhow::Result<DepartmentBundle> {
    let schemes = sqlx::query("SELECT id, name, settings FROM obe_attainment.schemes ORDER BY id")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| -> anyhow::Result<Scheme> {
            Ok(Scheme {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                settings: row.try_get::<Json<SchemeSettings>, _>("settings")?.0,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .context("failed to decode schemes")?;

    let configuration: BTreeMap<String, Value> =
        sqlx::query("SELECT key, value FROM obe_attainment.configuration")
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|row| -> anyhow::Result<(String, Value)> {
                Ok((row.try_get("key")?, row.try_get::<Json<Value>, _>("value")?.0))
            })
            .collect::<anyhow::Result<_>>()?;

    let global_settings = configuration
        .get("global_scheme_settings")
        .cloned()
        .map(serde_json::from_value::<SchemeSettings>)
        .transpose()
        .context("global_scheme_settings is not a valid scheme configuration")?;
    let reference_scheme = configuration
        .get("reference_scheme")
        .and_then(Value::as_str)
        .map(str::to_string);

    let outcomes = sqlx::query(
        r#"
        SELECT id, description
        FROM obe_attainment.outcomes
        WHERE department_id IS NULL OR department_id = $1
        "#,
    )
    .bind(department)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| -> anyhow::Result<Outcome> {
        Ok(Outcome {
            id: row.try_get("id")?,
            description: row.try_get("description")?,
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    let course_rows = sqlx::query(
        r#"
        SELECT id, code, name, semester, credits, scheme_id, cos, assessment_tools, settings
        FROM obe_attainment.courses
        WHERE department_id = $1
        ORDER BY code
        "#,
    )
    .bind(department)
    .fetch_all(pool)
    .await?;

    let mut courses = Vec::with_capacity(course_rows.len());
    for row in course_rows {
        let id: String = row.try_get("id")?;
        let semester: i32 = row.try_get("semester")?;
        let credits: i32 = row.try_get("credits")?;
        courses.push(Course {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            semester: u32::try_from(semester)
                .with_context(|| format!("course {id} has a negative semester"))?,
            credits: u32::try_from(credits)
                .with_context(|| format!("course {id} has negative credits"))?,
            scheme: row.try_get("scheme_id")?,
            cos: row
                .try_get::<Json<Vec<CourseOutcome>>, _>("cos")
                .with_context(|| format!("course {id} has malformed course outcomes"))?
                .0,
            assessment_tools: row
                .try_get::<Json<Vec<AssessmentTool>>, _>("assessment_tools")
                .with_context(|| format!("course {id} has malformed assessment tools"))?
                .0,
            settings: row
                .try_get::<Json<CourseSettings>, _>("settings")
                .with_context(|| format!("course {id} has malformed settings"))?
                .0,
            id,
        });
    }

    let course_ids: Vec<String> = courses.iter().map(|course| course.id.clone()).collect();

    let mut enrollments: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let enrollment_rows = sqlx::query(
        r#"
        SELECT course_id, student_id
        FROM obe_attainment.enrollments
        WHERE course_id = ANY($1)
        ORDER BY course_id, student_id
        "#,
    )
    .bind(&course_ids)
    .fetch_all(pool)
    .await?;
    for row in enrollment_rows {
        let course: String = row.try_get("course_id")?;
        enrollments
            .entry(course)
            .or_default()
            .push(row.try_get("student_id")?);
    }

    let marks = sqlx::query(
        r#"
        SELECT student_id, course_id, assessment_name, scores, improvement_test_for
        FROM obe_attainment.marks
        WHERE course_id = ANY($1)
        ORDER BY course_id, student_id, assessment_name
        "#,
    )
    .bind(&course_ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| -> anyhow::Result<MarksRecord> {
        Ok(MarksRecord {
            student: row.try_get("student_id")?,
            course: row.try_get("course_id")?,
            assessment_name: row.try_get("assessment_name")?,
            scores: row
                .try_get::<Json<BTreeMap<String, Score>>, _>("scores")?
                .0,
            improvement_test_for: row.try_get("improvement_test_for")?,
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()
    .context("failed to decode marks")?;

    let mut articulation = BTreeMap::new();
    let matrix_rows = sqlx::query(
        r#"
        SELECT course_id, matrix
        FROM obe_attainment.articulation_matrix
        WHERE course_id = ANY($1)
        "#,
    )
    .bind(&course_ids)
    .fetch_all(pool)
    .await?;
    for row in matrix_rows {
        let course: String = row.try_get("course_id")?;
        let matrix = row
            .try_get::<Json<StoredMatrix>, _>("matrix")
            .with_context(|| format!("course {course} has a malformed articulation matrix"))?
            .0
            .0;
        articulation.insert(course, matrix);
    }

    let survey = sqlx::query(
        r#"
        SELECT exit_survey, employer_survey, alumni_survey, updated_at
        FROM obe_attainment.surveys
        WHERE department_id = $1
        "#,
    )
    .bind(department)
    .fetch_optional(pool)
    .await?
    .map(|row| -> anyhow::Result<SurveyRecord> {
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        debug!(department, %updated_at, "loaded survey ratings");
        Ok(SurveyRecord {
            department: department.to_string(),
            exit_survey: row.try_get::<Json<BTreeMap<String, f64>>, _>("exit_survey")?.0,
            employer_survey: row
                .try_get::<Json<BTreeMap<String, f64>>, _>("employer_survey")?
                .0,
            alumni_survey: row.try_get::<Json<BTreeMap<String, f64>>, _>("alumni_survey")?.0,
        })
    })
    .transpose()
    .context("failed to decode survey ratings")?;

    info!(
        department,
        courses = courses.len(),
        marks = marks.len(),
        outcomes = outcomes.len(),
        "loaded department snapshot"
    );

    Ok(DepartmentBundle {
        department: department.to_string(),
        schemes,
        global_settings,
        reference_scheme,
        outcomes,
        courses,
        enrollments,
        marks,
        articulation,
        survey,
    })
}
