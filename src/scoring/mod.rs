// src/scoring/mod.rs
//! Skill-weight scoring with recency decay

pub mod export;

use crate::models::{JobRecord, JobWithSkills};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

/// Decay applied when the posting date is unknown
pub const UNKNOWN_DATE_DECAY: f64 = 0.3;

/// Shortest plain name allowed on either side of a substring match
const MIN_SUBSTRING_LEN: usize = 3;

/// Names carrying a symbol ("C#", "C++") are distinctive at this length
const MIN_SYMBOLIC_SUBSTRING_LEN: usize = 2;

/// Built-in spelling variants, alias → canonical (lowercase)
const BUILTIN_SYNONYMS: &[(&str, &str)] = &[
    ("reactjs", "react"),
    ("react.js", "react"),
    ("vuejs", "vue"),
    ("vue.js", "vue"),
    ("angularjs", "angular"),
    ("nodejs", "node.js"),
    ("node", "node.js"),
    ("nextjs", "next.js"),
    ("golang", "go"),
    ("postgres", "postgresql"),
    ("k8s", "kubernetes"),
    ("ts", "typescript"),
    ("js", "javascript"),
    ("ecmascript", "javascript"),
    ("py", "python"),
    ("dotnet", ".net"),
    ("csharp", "c#"),
    ("cpp", "c++"),
    ("gcp", "google cloud"),
    ("amazon web services", "aws"),
    ("ror", "ruby on rails"),
];

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    weights: BTreeMap<String, i64>,
    #[serde(default)]
    synonyms: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct ProfileEntry {
    name: String,
    key: String,
    weight: i64,
}

/// How a job skill was tied to a profile entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Exact,
    Synonym,
    Substring,
}

/// Operator relevance profile: skill name → weight, plus alias table
#[derive(Debug, Clone)]
pub struct SkillProfile {
    entries: Vec<ProfileEntry>,
    synonyms: HashMap<String, String>,
}

impl SkillProfile {
    pub fn new<I, S>(weights: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let entries = weights
            .into_iter()
            .map(|(name, weight)| {
                let name = name.into();
                ProfileEntry {
                    key: name.trim().to_lowercase(),
                    name,
                    weight,
                }
            })
            .collect();

        let synonyms = BUILTIN_SYNONYMS
            .iter()
            .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
            .collect();

        Self { entries, synonyms }
    }

    pub fn with_synonym(mut self, alias: &str, canonical: &str) -> Self {
        self.synonyms
            .insert(alias.trim().to_lowercase(), canonical.trim().to_lowercase());
        self
    }

    /// Parses a `[weights]` table and an optional `[synonyms]` table
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ProfileFile = toml::from_str(content).context("Invalid skill profile")?;
        let mut profile = Self::new(file.weights);
        for (alias, canonical) in &file.synonyms {
            profile = profile.with_synonym(alias, canonical);
        }
        Ok(profile)
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read skill profile: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load skill profile: {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn canonical<'a>(&'a self, key: &'a str) -> &'a str {
        self.synonyms.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Best profile entry for a skill name: exact, then synonym, then substring
    pub fn match_skill(&self, skill: &str) -> Option<(usize, MatchKind)> {
        let key = skill.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }

        if let Some(idx) = self.entries.iter().position(|e| e.key == key) {
            return Some((idx, MatchKind::Exact));
        }

        let canonical = self.canonical(&key);
        if let Some(idx) = self
            .entries
            .iter()
            .position(|e| self.canonical(&e.key) == canonical)
        {
            return Some((idx, MatchKind::Synonym));
        }

        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| substring_match(&e.key, &key))
            // longest entry is the most specific
            .max_by_key(|(idx, e)| (e.key.len(), std::cmp::Reverse(*idx)))
            .map(|(idx, _)| (idx, MatchKind::Substring))
    }

    /// Sum of weights over distinct profile entries hit by the required skills
    pub fn base_rating<'s>(&self, required: impl IntoIterator<Item = &'s str>) -> (i64, Vec<String>) {
        let mut hit = vec![false; self.entries.len()];
        let mut matched = Vec::new();
        let mut rating = 0;

        for skill in required {
            if let Some((idx, kind)) = self.match_skill(skill) {
                if !hit[idx] {
                    hit[idx] = true;
                    let entry = &self.entries[idx];
                    debug!("Skill '{}' matched '{}' ({:?})", skill, entry.name, kind);
                    rating += entry.weight;
                    matched.push(entry.name.clone());
                }
            }
        }
        (rating, matched)
    }
}

fn substring_match(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let min_len = if short.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        MIN_SYMBOLIC_SUBSTRING_LEN
    } else {
        MIN_SUBSTRING_LEN
    };
    short.chars().count() >= min_len && long.contains(short)
}

/// Recency multiplier in [0, 1]
pub fn time_decay(posted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(posted) = posted_at.filter(|p| p.timestamp() > 0) else {
        return UNKNOWN_DATE_DECAY;
    };

    let days = (now - posted).num_days().max(0);
    match days {
        0..=1 => 1.0,
        2..=7 => 1.0 - 0.1 * (days - 1) as f64,
        8..=14 => 0.2,
        _ => 0.05,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredJob {
    #[serde(flatten)]
    pub job: JobRecord,
    pub base_rating: i64,
    pub time_decay: f64,
    pub final_score: f64,
    pub matched_skills: Vec<String>,
}

/// Scores and orders jobs. Jobs whose required skills hit no profile entry
/// are left out.
pub fn rank(jobs: &[JobWithSkills], profile: &SkillProfile, now: DateTime<Utc>) -> Vec<ScoredJob> {
    let mut scored: Vec<ScoredJob> = jobs
        .iter()
        .filter_map(|entry| {
            let (base_rating, matched_skills) = profile.base_rating(entry.required_skills());
            if matched_skills.is_empty() {
                return None;
            }
            let time_decay = time_decay(entry.job.posted_at, now);
            Some(ScoredJob {
                job: entry.job.clone(),
                base_rating,
                time_decay,
                final_score: base_rating as f64 * time_decay,
                matched_skills,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| compare_posted_desc(a, b))
            .then_with(|| a.job.id.cmp(&b.job.id))
    });

    debug!("Ranked {} of {} jobs", scored.len(), jobs.len());
    scored
}

fn compare_posted_desc(a: &ScoredJob, b: &ScoredJob) -> Ordering {
    match (a.job.posted_at, b.job.posted_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
