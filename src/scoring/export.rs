// src/scoring/export.rs
//! Ranked list artifact for the reporting layer

use super::ScoredJob;
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    company: &'a str,
    location: &'a str,
    url: &'a str,
    posted_at: String,
    base_rating: i64,
    time_decay: f64,
    final_score: f64,
    matched_skills: String,
}

impl<'a> From<&'a ScoredJob> for CsvRow<'a> {
    fn from(scored: &'a ScoredJob) -> Self {
        Self {
            title: &scored.job.title,
            company: &scored.job.company,
            location: &scored.job.location,
            url: &scored.job.url,
            posted_at: scored
                .job
                .posted_at
                .map(|p| p.to_rfc3339())
                .unwrap_or_default(),
            base_rating: scored.base_rating,
            time_decay: scored.time_decay,
            final_score: scored.final_score,
            matched_skills: scored.matched_skills.join("; "),
        }
    }
}

pub fn write_ranked<W: Write>(ranked: &[ScoredJob], format: ExportFormat, mut out: W) -> Result<()> {
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, ranked).context("Failed to write JSON")?;
            writeln!(out)?;
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            for scored in ranked {
                writer
                    .serialize(CsvRow::from(scored))
                    .context("Failed to write CSV row")?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}
