// src/harvest.rs
//! Scrape pipeline: traversal → normalization → deduplicating store

use crate::browser::PageDriver;
use crate::models::{NewJob, NewSearchRun, NewSource, Source};
use crate::normalize::{self, RawCapture};
use crate::store::{BatchMode, JobStore};
use crate::traversal::{
    CardFailure, ListingTraversal, PageSink, SearchParams, SiteProfile, TraversalLimits,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

/// Separator for running several keyword searches in one invocation
pub const KEYWORD_SEPARATOR: char = ';';

/// What one search run did, for the operator
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub source: String,
    pub keywords: String,
    pub location: String,
    pub pages_visited: usize,
    pub cards_seen: usize,
    pub new_jobs: usize,
    pub updated_jobs: usize,
    /// Captures missing a title or company even after the card fallback
    pub discarded: usize,
    pub filtered_by_age: usize,
    pub failures: Vec<CardFailure>,
    pub fault: Option<String>,
    pub budget_exhausted: bool,
}

pub fn split_keywords(keywords: &str) -> Vec<String> {
    keywords
        .split(KEYWORD_SEPARATOR)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct Harvester<'a> {
    store: &'a dyn JobStore,
    page: &'a dyn PageDriver,
    profile: &'a SiteProfile,
    limits: &'a TraversalLimits,
    batch_mode: BatchMode,
}

impl<'a> Harvester<'a> {
    pub fn new(
        store: &'a dyn JobStore,
        page: &'a dyn PageDriver,
        profile: &'a SiteProfile,
        limits: &'a TraversalLimits,
    ) -> Self {
        Self {
            store,
            page,
            profile,
            limits,
            batch_mode: BatchMode::default(),
        }
    }

    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    /// One search run per `;`-separated keyword, in order
    pub async fn harvest(
        &self,
        keywords: &str,
        location: &str,
        max_age_secs: Option<u64>,
    ) -> Result<Vec<RunReport>> {
        let source = self.active_source().await?;
        let searches = split_keywords(keywords);
        if searches.is_empty() {
            bail!("No keywords given");
        }

        let mut reports = Vec::with_capacity(searches.len());
        for keyword in searches {
            let report = self
                .run_search(&source, &keyword, location, max_age_secs)
                .await
                .with_context(|| format!("Search '{}' on {} failed", keyword, source.name))?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn active_source(&self) -> Result<Source> {
        let source = self
            .store
            .ensure_source(&NewSource {
                name: self.profile.name.clone(),
                base_url: self.profile.base_url.clone(),
                description: self.profile.description.clone(),
            })
            .await?;
        if !source.is_active {
            bail!("Source '{}' is inactive", source.name);
        }
        Ok(source)
    }

    async fn run_search(
        &self,
        source: &Source,
        keywords: &str,
        location: &str,
        max_age_secs: Option<u64>,
    ) -> Result<RunReport> {
        let run = self
            .store
            .create_search_run(&NewSearchRun {
                source_id: source.id,
                keywords: keywords.to_string(),
                location: location.to_string(),
                max_age_seconds: max_age_secs.map(|s| s as i64),
            })
            .await?;

        let params = SearchParams {
            keywords: keywords.to_string(),
            location: location.to_string(),
            max_age: max_age_secs,
        };
        let mut writer = PageWriter {
            harvester: self,
            source_name: &source.name,
            run_id: run.id,
            max_age: max_age_secs.and_then(|s| Duration::try_seconds(s as i64)),
            report: RunReport {
                source: source.name.clone(),
                keywords: keywords.to_string(),
                location: location.to_string(),
                ..Default::default()
            },
        };
        let outcome = ListingTraversal::new(self.page, self.profile, self.limits)
            .run_paged(&params, &mut writer)
            .await?;

        let mut report = writer.report;
        report.pages_visited = outcome.pages_visited;
        report.cards_seen = outcome.cards_seen;
        report.failures = outcome.failures;
        report.fault = outcome.fault.map(|f| f.to_string());
        report.budget_exhausted = outcome.budget_exhausted;

        if let Some(fault) = &report.fault {
            error!("Search '{}' on {} ended with a fault: {}", keywords, source.name, fault);
        }
        info!(
            "Search '{}' on {}: {} pages, {} cards, {} new, {} updated, {} discarded, {} too old, {} card failures",
            keywords,
            source.name,
            report.pages_visited,
            report.cards_seen,
            report.new_jobs,
            report.updated_jobs,
            report.discarded,
            report.filtered_by_age,
            report.failures.len()
        );
        Ok(report)
    }

    fn prepare_batch(
        &self,
        captures: &[RawCapture],
        now: DateTime<Utc>,
        max_age: Option<Duration>,
        report: &mut RunReport,
    ) -> Vec<NewJob> {
        let mut jobs = Vec::with_capacity(captures.len());
        for capture in captures {
            let job = match normalize::normalize(capture, now) {
                Ok(job) => job,
                Err(e) => {
                    debug!(
                        "Discarding card {} on page {}: {}",
                        capture.card_index, capture.page, e
                    );
                    report.discarded += 1;
                    continue;
                }
            };
            if is_too_old(&job, now, max_age) {
                debug!("Skipping '{}': posted before the max-age window", job.title);
                report.filtered_by_age += 1;
                continue;
            }
            jobs.push(job);
        }
        jobs
    }

    async fn persist_batch(
        &self,
        jobs: &[NewJob],
        source_name: &str,
        run_id: i64,
        report: &mut RunReport,
    ) -> Result<()> {
        let batch = self
            .store
            .batch_upsert_jobs(jobs, source_name, self.batch_mode)
            .await?;
        report.new_jobs += batch.inserted;
        report.updated_jobs += batch.updated;

        for (job, outcome) in jobs.iter().zip(&batch.outcomes) {
            let job_id = outcome.record.id;
            debug!(
                "{} job {} ({})",
                if outcome.is_new { "Inserted" } else { "Updated" },
                job.external_id,
                job.title
            );
            self.store.link_job_to_search_run(job_id, run_id).await?;
            for skill in &job.skills {
                let stored = self.store.find_or_create_skill(&skill.name).await?;
                self.store
                    .link_skill_to_job(job_id, stored.id, skill.required)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Normalizes and stores one results page as the traversal leaves it
struct PageWriter<'h, 'a> {
    harvester: &'h Harvester<'a>,
    source_name: &'h str,
    run_id: i64,
    max_age: Option<Duration>,
    report: RunReport,
}

#[async_trait]
impl PageSink for PageWriter<'_, '_> {
    async fn page_done(&mut self, captures: Vec<RawCapture>) -> Result<()> {
        let jobs = self
            .harvester
            .prepare_batch(&captures, Utc::now(), self.max_age, &mut self.report);
        if jobs.is_empty() {
            return Ok(());
        }
        self.harvester
            .persist_batch(&jobs, self.source_name, self.run_id, &mut self.report)
            .await
    }
}

fn is_too_old(job: &NewJob, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
    match (job.posted_at, max_age) {
        (Some(posted), Some(limit)) => now - posted > limit,
        _ => false,
    }
}
