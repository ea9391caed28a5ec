// src/store/sqlite.rs
//! SQLite-backed job store

use super::{BatchMode, BatchUpsertReport, JobStore};
use crate::core::Database;
use crate::models::{
    JobRecord, JobSkill, JobWithSkills, NewJob, NewSearchRun, NewSource, SearchRun, Skill, Source,
    UpsertOutcome,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const JOB_COLUMNS: &str = "id, source_id, external_id, title, company, location, details, skills, url, posted_at, captured_at";

/// True when a write lost a race on a UNIQUE constraint
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    async fn source_id(&self, name: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM sources WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("Source '{}' not found", name))
    }
}

async fn existing_job_id(
    conn: &mut SqliteConnection,
    source_id: i64,
    external_id: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM jobs WHERE source_id = ? AND external_id = ?")
        .bind(source_id)
        .bind(external_id)
        .fetch_optional(&mut *conn)
        .await
}

async fn insert_job(
    conn: &mut SqliteConnection,
    source_id: i64,
    job: &NewJob,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (source_id, external_id, title, company, location, details, skills, url, posted_at, captured_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(source_id)
    .bind(&job.external_id)
    .bind(&job.title)
    .bind(&job.company)
    .bind(&job.location)
    .bind(&job.details)
    .bind(job.skills_text())
    .bind(&job.url)
    .bind(job.posted_at)
    .bind(job.captured_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrites every mutable field of the job with this identity
async fn update_job(
    conn: &mut SqliteConnection,
    source_id: i64,
    job: &NewJob,
) -> Result<i64, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET title = ?, company = ?, location = ?, details = ?, skills = ?, url = ?,
            posted_at = ?, captured_at = ?
        WHERE source_id = ? AND external_id = ?
        "#,
    )
    .bind(&job.title)
    .bind(&job.company)
    .bind(&job.location)
    .bind(&job.details)
    .bind(job.skills_text())
    .bind(&job.url)
    .bind(job.posted_at)
    .bind(job.captured_at)
    .bind(source_id)
    .bind(&job.external_id)
    .execute(&mut *conn)
    .await?;

    existing_job_id(conn, source_id, &job.external_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// External id → row id for every job of the source
async fn known_ids(
    conn: &mut SqliteConnection,
    source_id: i64,
) -> Result<HashMap<String, i64>, sqlx::Error> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT external_id, id FROM jobs WHERE source_id = ?")
            .bind(source_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Inserts or updates one job given an existence answer that may be stale.
/// An insert that loses a race with another writer hits the UNIQUE index.
async fn write_job(
    conn: &mut SqliteConnection,
    source_id: i64,
    job: &NewJob,
    known: bool,
    mode: BatchMode,
) -> Result<(i64, bool)> {
    if known {
        return Ok((update_job(conn, source_id, job).await?, false));
    }
    match insert_job(conn, source_id, job).await {
        Ok(id) => Ok((id, true)),
        Err(e) if is_unique_violation(&e) => match mode {
            BatchMode::Strict => Err(anyhow!("Identity conflict for job {}", job.external_id)),
            BatchMode::BestEffort => {
                warn!("Identity conflict for {}, converted to update", job.external_id);
                Ok((update_job(conn, source_id, job).await?, false))
            }
        },
        Err(e) => Err(e.into()),
    }
}

/// Writes `jobs` in order against the pre-fetched `known` identities
async fn write_batch(
    conn: &mut SqliteConnection,
    source_id: i64,
    jobs: &[NewJob],
    mode: BatchMode,
    mut known: HashMap<String, i64>,
) -> Result<BatchUpsertReport> {
    let mut report = BatchUpsertReport::default();
    for job in jobs {
        let is_known = known.contains_key(&job.external_id);
        let (id, is_new) = write_job(conn, source_id, job, is_known, mode).await?;
        known.insert(job.external_id.clone(), id);
        report.record(UpsertOutcome {
            is_new,
            record: load_job(conn, id).await?,
        });
    }
    Ok(report)
}

async fn load_job(conn: &mut SqliteConnection, id: i64) -> Result<JobRecord, sqlx::Error> {
    sqlx::query_as::<_, JobRecord>(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
        .bind(id)
        .fetch_one(&mut *conn)
        .await
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_source(&self, source: &NewSource) -> Result<Source> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO sources (name, base_url, description, is_active, created_at)
            VALUES (?, ?, ?, TRUE, ?)
            "#,
        )
        .bind(&source.name)
        .bind(&source.base_url)
        .bind(&source.description)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create source '{}'", source.name))?;

        info!("Created source: {} ({})", source.name, source.base_url);
        Ok(Source {
            id: result.last_insert_rowid(),
            name: source.name.clone(),
            base_url: source.base_url.clone(),
            description: source.description.clone(),
            is_active: true,
            created_at: now,
        })
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>(
            "SELECT id, name, base_url, description, is_active, created_at FROM sources WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT id, name, base_url, description, is_active, created_at FROM sources ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    async fn set_source_active(&self, name: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE sources SET is_active = ? WHERE name = ?")
            .bind(active)
            .bind(name)
            .execute(&self.pool)
            .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!("Source {} is now {}", name, if active { "active" } else { "inactive" });
        }
        Ok(updated)
    }

    async fn upsert_job(&self, job: &NewJob, source_name: &str) -> Result<UpsertOutcome> {
        let source_id = self.source_id(source_name).await?;
        let mut tx = self.pool.begin().await?;

        let known = existing_job_id(&mut tx, source_id, &job.external_id)
            .await?
            .is_some();
        let (id, is_new) = write_job(&mut tx, source_id, job, known, BatchMode::BestEffort).await?;

        let record = load_job(&mut tx, id).await?;
        tx.commit().await?;
        Ok(UpsertOutcome { is_new, record })
    }

    async fn batch_upsert_jobs(
        &self,
        jobs: &[NewJob],
        source_name: &str,
        mode: BatchMode,
    ) -> Result<BatchUpsertReport> {
        let source_id = self.source_id(source_name).await?;
        let mut tx = self.pool.begin().await?;
        let known = known_ids(&mut tx, source_id).await?;
        let report = write_batch(&mut tx, source_id, jobs, mode, known)
            .await
            .with_context(|| format!("Batch upsert for {} failed", source_name))?;
        tx.commit().await?;
        debug!(
            "Batch upsert for {}: {} inserted, {} updated",
            source_name, report.inserted, report.updated
        );
        Ok(report)
    }

    async fn create_search_run(&self, run: &NewSearchRun) -> Result<SearchRun> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO search_runs (source_id, keywords, location, max_age_seconds, run_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.source_id)
        .bind(&run.keywords)
        .bind(&run.location)
        .bind(run.max_age_seconds)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(SearchRun {
            id: result.last_insert_rowid(),
            source_id: run.source_id,
            keywords: run.keywords.clone(),
            location: run.location.clone(),
            max_age_seconds: run.max_age_seconds,
            run_at: now,
        })
    }

    async fn link_job_to_search_run(&self, job_id: i64, search_run_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO search_run_jobs (search_run_id, job_id) VALUES (?, ?)")
            .bind(search_run_id)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_or_create_skill(&self, name: &str) -> Result<Skill> {
        sqlx::query("INSERT OR IGNORE INTO skills (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        let skill = sqlx::query_as::<_, Skill>("SELECT id, name FROM skills WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to load skill '{}'", name))?;
        Ok(skill)
    }

    async fn link_skill_to_job(&self, job_id: i64, skill_id: i64, required: bool) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO job_skills (job_id, skill_id, required) VALUES (?, ?, ?)")
            .bind(job_id)
            .bind(skill_id)
            .bind(required)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn jobs_with_skills(&self) -> Result<Vec<JobWithSkills>> {
        let jobs = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {} FROM jobs ORDER BY id ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let links: Vec<(i64, String, bool)> = sqlx::query_as(
            r#"
            SELECT js.job_id, s.name, js.required
            FROM job_skills js
            JOIN skills s ON s.id = js.skill_id
            ORDER BY js.job_id ASC, s.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_job: HashMap<i64, Vec<JobSkill>> = HashMap::new();
        for (job_id, name, required) in links {
            by_job
                .entry(job_id)
                .or_default()
                .push(JobSkill { name, required });
        }

        Ok(jobs
            .into_iter()
            .map(|job| JobWithSkills {
                skills: by_job.remove(&job.id).unwrap_or_default(),
                job,
            })
            .collect())
    }
}
