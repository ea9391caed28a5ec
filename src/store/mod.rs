// src/store/mod.rs
//! Deduplicating persistence contract. Identity of a job is
//! (source name, external id); the latest scrape always wins.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

use crate::models::{
    JobWithSkills, NewJob, NewSearchRun, NewSource, SearchRun, Skill, Source, UpsertOutcome,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// An identity conflict racing with another writer fails the batch
    Strict,
    /// Such conflicts are converted into updates
    #[default]
    BestEffort,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchUpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub outcomes: Vec<UpsertOutcome>,
}

impl BatchUpsertReport {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        if outcome.is_new {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
        self.outcomes.push(outcome);
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_source(&self, source: &NewSource) -> Result<Source>;

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>>;

    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Returns whether a source with that name existed
    async fn set_source_active(&self, name: &str, active: bool) -> Result<bool>;

    async fn upsert_job(&self, job: &NewJob, source_name: &str) -> Result<UpsertOutcome>;

    /// Resolves identities against one pre-fetched existence set
    async fn batch_upsert_jobs(
        &self,
        jobs: &[NewJob],
        source_name: &str,
        mode: BatchMode,
    ) -> Result<BatchUpsertReport>;

    async fn create_search_run(&self, run: &NewSearchRun) -> Result<SearchRun>;

    async fn link_job_to_search_run(&self, job_id: i64, search_run_id: i64) -> Result<()>;

    /// Exact-name lookup; a new spelling variant creates a new skill
    async fn find_or_create_skill(&self, name: &str) -> Result<Skill>;

    /// No-op when the same (job, skill, required) link exists
    async fn link_skill_to_job(&self, job_id: i64, skill_id: i64, required: bool) -> Result<()>;

    /// Read model for scoring
    async fn jobs_with_skills(&self) -> Result<Vec<JobWithSkills>>;

    async fn ensure_source(&self, source: &NewSource) -> Result<Source> {
        match self.find_source_by_name(&source.name).await? {
            Some(existing) => Ok(existing),
            None => self.create_source(source).await,
        }
    }
}
