// src/models.rs
//! Canonical records shared by traversal, persistence and scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== Sources =====

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSource {
    pub name: String,
    pub base_url: String,
    pub description: String,
}

// ===== Jobs =====

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub source_id: i64,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub details: String,
    pub skills: String,
    pub url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
}

/// A skill harvested from source text, with the casing it had there
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedSkill {
    pub name: String,
    pub required: bool,
}

/// A normalized job ready for the deduplicating store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewJob {
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub details: String,
    pub skills: Vec<ExtractedSkill>,
    pub url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
}

impl NewJob {
    /// Free-text skills column as stored on the job row
    pub fn skills_text(&self) -> String {
        self.skills
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub is_new: bool,
    pub record: JobRecord,
}

// ===== Search runs =====

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchRun {
    pub id: i64,
    pub source_id: i64,
    pub keywords: String,
    pub location: String,
    pub max_age_seconds: Option<i64>,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSearchRun {
    pub source_id: i64,
    pub keywords: String,
    pub location: String,
    pub max_age_seconds: Option<i64>,
}

// ===== Skills =====

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq, Eq)]
pub struct Skill {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSkill {
    pub name: String,
    pub required: bool,
}

/// Read model consumed by the scoring engine
#[derive(Debug, Clone, Serialize)]
pub struct JobWithSkills {
    pub job: JobRecord,
    pub skills: Vec<JobSkill>,
}

impl JobWithSkills {
    pub fn required_skills(&self) -> impl Iterator<Item = &str> {
        self.skills
            .iter()
            .filter(|s| s.required)
            .map(|s| s.name.as_str())
    }
}
