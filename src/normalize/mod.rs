// src/normalize/mod.rs
//! Raw captures → canonical job records

pub mod dates;
pub mod skills;

use crate::errors::NormalizeError;
use crate::models::NewJob;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

/// Stand-in company for third-party postings whose employer could not be read
pub const PLACEHOLDER_COMPANY: &str = "Company (see description)";

/// Query parameters that name the posting on known sites
const ID_PARAMS: &[&str] = &["currentJobId", "jobId", "job_id", "jobid", "jk", "vjk", "gh_jid", "id"];

const TRACKING_PARAMS: &[&str] = &[
    "trk", "trkInfo", "trackingId", "refId", "eBP", "from", "position", "pageNum", "tk", "ref",
];

static KNOWN_ID_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{4,}$").expect("id value pattern is valid"));

static NUMERIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5,}$").expect("numeric id pattern is valid"));

static TRAILING_NUMERIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_](\d{5,})$").expect("slug id pattern is valid"));

static URN_NUMERIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[:_-](\d{5,})$").expect("urn id pattern is valid"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CaptureOrigin {
    /// Detail view on the origin site
    #[default]
    Detail,
    /// Detail page on a third-party site
    External,
    /// Listing card summary, used when the detail view failed
    CardSummary,
}

/// Text captured for one card, before any cleanup
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawCapture {
    pub origin: CaptureOrigin,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub details: Option<String>,
    /// Structured skills field when the site has one
    pub skills: Option<String>,
    pub posted: Option<String>,
    pub url: String,
    /// Identifier read from the listing card when it carries no usable link
    pub card_id: Option<String>,
    pub page: usize,
    pub card_index: usize,
}

/// Collapse whitespace and newlines to single spaces
pub fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// URL without fragment and tracking parameters
pub fn canonical_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| {
            !key.starts_with("utm_") && !TRACKING_PARAMS.iter().any(|t| t == key)
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept.iter());
    }
    url.to_string()
}

/// The identifier a source uses for a posting. Prefers an id embedded in
/// the URL; falls back to the canonical URL itself.
pub fn derive_external_id(raw_url: &str) -> String {
    let canonical = canonical_url(raw_url);
    let Ok(url) = Url::parse(&canonical) else {
        return canonical;
    };

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    for param in ID_PARAMS {
        if let Some((_, value)) = pairs.iter().find(|(k, _)| k == param) {
            if KNOWN_ID_VALUE.is_match(value) {
                return value.clone();
            }
        }
    }

    if let Some(segments) = url.path_segments() {
        let segments: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
        for segment in segments.iter().rev() {
            if NUMERIC_ID.is_match(segment) {
                return segment.to_string();
            }
            if let Some(caps) = TRAILING_NUMERIC_ID.captures(segment) {
                return caps[1].to_string();
            }
        }
    }

    if let Some((_, value)) = pairs.iter().find(|(_, v)| NUMERIC_ID.is_match(v)) {
        return value.clone();
    }

    canonical
}

/// Card attribute value as an external id. `urn:li:jobPosting:3901234567`
/// yields the trailing number so it agrees with ids read from posting URLs.
pub fn card_identity(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match URN_NUMERIC_ID.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    })
}

/// Validates and cleans a capture. Title and company are required, except
/// that third-party postings may carry the placeholder company.
pub fn normalize(raw: &RawCapture, now: DateTime<Utc>) -> Result<NewJob, NormalizeError> {
    let cleaned = |field: &Option<String>| field.as_deref().map(clean_text).unwrap_or_default();

    let title = cleaned(&raw.title);
    if title.is_empty() {
        return Err(NormalizeError::MissingTitle);
    }

    let mut company = cleaned(&raw.company);
    if company.is_empty() {
        if raw.origin == CaptureOrigin::External {
            company = PLACEHOLDER_COMPANY.to_string();
        } else {
            return Err(NormalizeError::MissingCompany);
        }
    }

    let skills = match raw.skills.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(field) => skills::split_skill_field(field),
        None => skills::extract_skills(raw.details.as_deref().unwrap_or_default()),
    };

    let url = canonical_url(&raw.url);
    Ok(NewJob {
        external_id: raw
            .card_id
            .as_deref()
            .and_then(card_identity)
            .unwrap_or_else(|| derive_external_id(&url)),
        title,
        company,
        location: cleaned(&raw.location),
        details: cleaned(&raw.details),
        skills,
        url,
        posted_at: raw
            .posted
            .as_deref()
            .and_then(|p| dates::parse_posted(p, now)),
        captured_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Senior\n\n  Rust   Engineer \t"), "Senior Rust Engineer");
        assert_eq!(clean_text("\n \n"), "");
    }

    #[test]
    fn test_canonical_url_strips_tracking() {
        assert_eq!(
            canonical_url("https://www.linkedin.com/jobs/view/3812345678/?refId=abc&trackingId=x%3D&utm_source=feed#top"),
            "https://www.linkedin.com/jobs/view/3812345678/"
        );
        assert_eq!(
            canonical_url("https://jobs.test/view?jk=abc123&from=serp"),
            "https://jobs.test/view?jk=abc123"
        );
    }

    #[test]
    fn test_external_id_from_query_and_path() {
        assert_eq!(
            derive_external_id("https://www.linkedin.com/jobs/search/?currentJobId=3901234567&keywords=rust"),
            "3901234567"
        );
        assert_eq!(derive_external_id("https://www.indeed.com/viewjob?jk=5f1e2d3c4b5a6978"), "5f1e2d3c4b5a6978");
        assert_eq!(
            derive_external_id("https://www.linkedin.com/jobs/view/senior-rust-engineer-at-acme-3812345678?trk=x"),
            "3812345678"
        );
        assert_eq!(derive_external_id("https://boards.greenhouse.io/acme/jobs/4455667"), "4455667");
    }

    #[test]
    fn test_external_id_falls_back_to_url() {
        assert_eq!(
            derive_external_id("https://careers.acme.com/positions/backend-engineer?utm_medium=x"),
            "https://careers.acme.com/positions/backend-engineer"
        );
    }

    #[test]
    fn test_card_identity() {
        assert_eq!(card_identity("urn:li:jobPosting:3901234567").as_deref(), Some("3901234567"));
        assert_eq!(card_identity(" 5f1e2d3c4b5a6978 ").as_deref(), Some("5f1e2d3c4b5a6978"));
        assert_eq!(card_identity("   "), None);
    }

    #[test]
    fn test_card_id_takes_precedence_over_url() {
        let raw = RawCapture {
            title: Some("Rust Engineer".to_string()),
            company: Some("Acme".to_string()),
            url: "https://jobs.test/search?q=rust".to_string(),
            card_id: Some("job-778899".to_string()),
            ..Default::default()
        };
        let job = normalize(&raw, now()).unwrap();
        assert_eq!(job.external_id, "778899");
        assert_eq!(job.url, "https://jobs.test/search?q=rust");
    }

    #[test]
    fn test_normalize_requires_title_and_company() {
        let raw = RawCapture {
            title: Some("  ".to_string()),
            company: Some("Acme".to_string()),
            url: "https://jobs.test/jobs/123456".to_string(),
            ..Default::default()
        };
        assert_eq!(normalize(&raw, now()), Err(NormalizeError::MissingTitle));

        let raw = RawCapture {
            title: Some("Rust Engineer".to_string()),
            url: "https://jobs.test/jobs/123456".to_string(),
            ..Default::default()
        };
        assert_eq!(normalize(&raw, now()), Err(NormalizeError::MissingCompany));
    }

    #[test]
    fn test_external_capture_gets_placeholder_company() {
        let raw = RawCapture {
            origin: CaptureOrigin::External,
            title: Some("Platform Engineer".to_string()),
            details: Some("Experience with Kubernetes and Terraform.".to_string()),
            url: "https://careers.example.org/p/platform".to_string(),
            ..Default::default()
        };
        let job = normalize(&raw, now()).unwrap();
        assert_eq!(job.company, PLACEHOLDER_COMPANY);
        assert_eq!(job.external_id, "https://careers.example.org/p/platform");
        let names: Vec<_> = job.skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Kubernetes", "Terraform"]);
    }

    #[test]
    fn test_normalize_full_record() {
        let raw = RawCapture {
            title: Some("Senior\n  Rust Engineer".to_string()),
            company: Some(" Acme  GmbH ".to_string()),
            location: Some("Berlin,\nGermany".to_string()),
            details: Some("We use Rust.\n\nNice to have: Kafka".to_string()),
            skills: Some("Rust, Tokio".to_string()),
            posted: Some("3 days ago".to_string()),
            url: "https://jobs.test/jobs/view/998877?trk=abc".to_string(),
            ..Default::default()
        };
        let job = normalize(&raw, now()).unwrap();
        assert_eq!(job.title, "Senior Rust Engineer");
        assert_eq!(job.company, "Acme GmbH");
        assert_eq!(job.location, "Berlin, Germany");
        assert_eq!(job.details, "We use Rust. Nice to have: Kafka");
        assert_eq!(job.url, "https://jobs.test/jobs/view/998877");
        assert_eq!(job.external_id, "998877");
        assert_eq!(job.skills_text(), "Rust, Tokio");
        assert_eq!(job.posted_at, Some(now() - Duration::days(3)));
        assert_eq!(job.captured_at, now());
    }
}
