// src/core/database.rs
//! Database connection management and schema setup

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

use crate::utils::ensure_dir_exists;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create new database connection with automatic setup
    pub async fn new(database_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir_exists(parent).await?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path.display());
        let pool = SqlitePool::connect(&database_url).await.with_context(|| {
            format!("Failed to connect to database: {}", database_path.display())
        })?;

        info!(
            "Database connection established: {}",
            database_path.display()
        );

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Private in-memory database; a single connection keeps one shared schema
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get pool reference for custom operations
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                base_url TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                external_id TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                details TEXT NOT NULL DEFAULT '',
                skills TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                posted_at TEXT,
                captured_at TEXT NOT NULL,
                CONSTRAINT jobs_identity UNIQUE (source_id, external_id)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS search_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL REFERENCES sources(id),
                keywords TEXT NOT NULL,
                location TEXT NOT NULL DEFAULT '',
                max_age_seconds INTEGER,
                run_at TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS search_run_jobs (
                search_run_id INTEGER NOT NULL REFERENCES search_runs(id),
                job_id INTEGER NOT NULL REFERENCES jobs(id),
                PRIMARY KEY (search_run_id, job_id)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS skills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS job_skills (
                job_id INTEGER NOT NULL REFERENCES jobs(id),
                skill_id INTEGER NOT NULL REFERENCES skills(id),
                required BOOLEAN NOT NULL,
                PRIMARY KEY (job_id, skill_id, required)
            );
            "#,
            "CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source_id);",
            "CREATE INDEX IF NOT EXISTS idx_job_skills_job ON job_skills(job_id);",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Database migration failed")?;
        }

        info!("Database migrations completed");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}
