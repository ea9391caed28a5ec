// src/store/memory.rs
//! In-process store for dry runs and tests

use super::{BatchMode, BatchUpsertReport, JobStore};
use crate::models::{
    JobRecord, JobSkill, JobWithSkills, NewJob, NewSearchRun, NewSource, SearchRun, Skill, Source,
    UpsertOutcome,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    sources: Vec<Source>,
    jobs: BTreeMap<i64, JobRecord>,
    identity: HashMap<(i64, String), i64>,
    search_runs: Vec<SearchRun>,
    run_jobs: BTreeSet<(i64, i64)>,
    skills: Vec<Skill>,
    job_skills: BTreeSet<(i64, i64, bool)>,
    next_job_id: i64,
}

impl Tables {
    fn source_id(&self, name: &str) -> Result<i64> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| anyhow!("Source '{}' not found", name))
    }

    fn upsert(&mut self, source_id: i64, job: &NewJob) -> UpsertOutcome {
        let key = (source_id, job.external_id.clone());
        let existing = self.identity.get(&key).copied();
        let is_new = existing.is_none();
        let id = existing.unwrap_or_else(|| {
            self.next_job_id += 1;
            self.next_job_id
        });

        let record = JobRecord {
            id,
            source_id,
            external_id: job.external_id.clone(),
            title: job.title.clone(),
            company: job.company.clone(),
            location: job.location.clone(),
            details: job.details.clone(),
            skills: job.skills_text(),
            url: job.url.clone(),
            posted_at: job.posted_at,
            captured_at: job.captured_at,
        };
        self.identity.insert(key, id);
        self.jobs.insert(id, record.clone());
        UpsertOutcome { is_new, record }
    }
}

/// `JobStore` over plain collections behind one async lock
#[derive(Default)]
pub struct MemoryJobStore {
    tables: Mutex<Tables>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.tables.lock().await.jobs.len()
    }

    /// Job count from synchronous test hooks; `None` while a write holds the lock
    #[cfg(test)]
    pub fn try_job_count(&self) -> Option<usize> {
        self.tables.try_lock().ok().map(|t| t.jobs.len())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_source(&self, source: &NewSource) -> Result<Source> {
        let mut tables = self.tables.lock().await;
        if tables.sources.iter().any(|s| s.name == source.name) {
            return Err(anyhow!("Source '{}' already exists", source.name));
        }
        let created = Source {
            id: tables.sources.len() as i64 + 1,
            name: source.name.clone(),
            base_url: source.base_url.clone(),
            description: source.description.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        tables.sources.push(created.clone());
        Ok(created)
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        let tables = self.tables.lock().await;
        Ok(tables.sources.iter().find(|s| s.name == name).cloned())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let tables = self.tables.lock().await;
        let mut sources = tables.sources.clone();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn set_source_active(&self, name: &str, active: bool) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.sources.iter_mut().find(|s| s.name == name) {
            Some(source) => {
                source.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_job(&self, job: &NewJob, source_name: &str) -> Result<UpsertOutcome> {
        let mut tables = self.tables.lock().await;
        let source_id = tables.source_id(source_name)?;
        Ok(tables.upsert(source_id, job))
    }

    async fn batch_upsert_jobs(
        &self,
        jobs: &[NewJob],
        source_name: &str,
        _mode: BatchMode,
    ) -> Result<BatchUpsertReport> {
        // The lock serializes writers, so no concurrent conflict can arise
        let mut tables = self.tables.lock().await;
        let source_id = tables.source_id(source_name)?;
        let mut report = BatchUpsertReport::default();
        for job in jobs {
            report.record(tables.upsert(source_id, job));
        }
        Ok(report)
    }

    async fn create_search_run(&self, run: &NewSearchRun) -> Result<SearchRun> {
        let mut tables = self.tables.lock().await;
        let created = SearchRun {
            id: tables.search_runs.len() as i64 + 1,
            source_id: run.source_id,
            keywords: run.keywords.clone(),
            location: run.location.clone(),
            max_age_seconds: run.max_age_seconds,
            run_at: Utc::now(),
        };
        tables.search_runs.push(created.clone());
        Ok(created)
    }

    async fn link_job_to_search_run(&self, job_id: i64, search_run_id: i64) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.run_jobs.insert((search_run_id, job_id));
        Ok(())
    }

    async fn find_or_create_skill(&self, name: &str) -> Result<Skill> {
        let mut tables = self.tables.lock().await;
        if let Some(skill) = tables.skills.iter().find(|s| s.name == name) {
            return Ok(skill.clone());
        }
        let skill = Skill {
            id: tables.skills.len() as i64 + 1,
            name: name.to_string(),
        };
        tables.skills.push(skill.clone());
        Ok(skill)
    }

    async fn link_skill_to_job(&self, job_id: i64, skill_id: i64, required: bool) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.job_skills.insert((job_id, skill_id, required));
        Ok(())
    }

    async fn jobs_with_skills(&self) -> Result<Vec<JobWithSkills>> {
        let tables = self.tables.lock().await;
        let names: HashMap<i64, &str> = tables
            .skills
            .iter()
            .map(|s| (s.id, s.name.as_str()))
            .collect();

        Ok(tables
            .jobs
            .values()
            .map(|job| JobWithSkills {
                job: job.clone(),
                skills: tables
                    .job_skills
                    .iter()
                    .filter(|(job_id, _, _)| *job_id == job.id)
                    .filter_map(|(_, skill_id, required)| {
                        names.get(skill_id).map(|name| JobSkill {
                            name: name.to_string(),
                            required: *required,
                        })
                    })
                    .collect(),
            })
            .collect())
    }
}
