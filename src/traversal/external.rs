// src/traversal/external.rs
//! Detail extraction on third-party pages whose markup is unknown.
//! Strategies run in order: structured selectors, page title heuristics,
//! applicant-tracking-system paths, then the domain name.

use crate::browser::PageDriver;
use crate::normalize::{CaptureOrigin, RawCapture};
use crate::resolver::SelectorResolver;
use tracing::debug;
use url::Url;

const TITLE_SELECTORS: &[&str] = &[
    "[itemprop='title']",
    "h1[class*='title']",
    "h1",
    "[class*='job-title']",
    "[class*='position']",
    "[class*='title']",
];

const COMPANY_SELECTORS: &[&str] = &[
    "[itemprop='hiringOrganization'] [itemprop='name']",
    "[class*='company-name']",
    "[class*='company']",
    "[class*='employer']",
    "[class*='organization']",
];

const LOCATION_SELECTORS: &[&str] = &[
    "[itemprop='jobLocation']",
    "[class*='location']",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    "[itemprop='description']",
    "[class*='description']",
    "[class*='content']",
    "[class*='details']",
    "article",
    "main",
    "body",
];

/// Title separators, most specific first
const TITLE_SEPARATORS: &[&str] = &[" at ", " - ", " | ", " – ", " — "];

/// Hosts whose first label says nothing about the employer
const GENERIC_HOSTS: &[&str] = &[
    "linkedin.com",
    "indeed.com",
    "glassdoor.com",
    "ziprecruiter.com",
    "monster.com",
    "smartrecruiters.com",
    "myworkdayjobs.com",
    "icims.com",
    "google.com",
];

const HOST_PREFIXES: &[&str] = &["www.", "careers.", "jobs.", "apply.", "boards.", "job-boards."];

/// Captures what it can from the page currently loaded at `url`
pub async fn extract_external(page: &dyn PageDriver, url: &str) -> RawCapture {
    let resolver = SelectorResolver::new(page);
    let parsed = Url::parse(url).ok();

    let mut title = resolver.text_of(None, TITLE_SELECTORS).await;
    let mut company = resolver.text_of(None, COMPANY_SELECTORS).await;

    if title.is_none() || company.is_none() {
        let page_title = page.title().await.unwrap_or_default();
        if let Some((t, c)) = split_title_company(&page_title) {
            debug!("External page title split into '{}' / '{}'", t, c);
            title = title.or(Some(t));
            company = company.or(Some(c));
        } else if title.is_none() && !page_title.trim().is_empty() {
            title = Some(page_title.trim().to_string());
        }
    }

    if company.is_none() {
        company = parsed
            .as_ref()
            .and_then(|u| company_from_ats(u).or_else(|| company_from_domain(u)));
        if let Some(name) = &company {
            debug!("Company for {} derived from URL: {}", url, name);
        }
    }

    RawCapture {
        origin: CaptureOrigin::External,
        title,
        company,
        location: resolver.text_of(None, LOCATION_SELECTORS).await,
        details: resolver.text_of(None, DESCRIPTION_SELECTORS).await,
        url: url.to_string(),
        ..Default::default()
    }
}

/// "Backend Engineer - Acme" → ("Backend Engineer", "Acme")
pub fn split_title_company(page_title: &str) -> Option<(String, String)> {
    let trimmed = page_title.trim();
    for separator in TITLE_SEPARATORS {
        if let Some((left, right)) = trimmed.split_once(separator) {
            let title = left.trim();
            // "Title - Company | Careers": keep the segment right after the title
            let company = TITLE_SEPARATORS
                .iter()
                .fold(right, |rest, sep| rest.split(sep).next().unwrap_or(rest))
                .trim();
            if !title.is_empty() && !company.is_empty() && !is_boilerplate(company) {
                return Some((title.to_string(), company.to_string()));
            }
        }
    }
    None
}

fn is_boilerplate(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    ["careers", "jobs", "job board", "apply", "job application"]
        .iter()
        .any(|b| lower == *b)
}

/// Company slug from well-known applicant tracking system URLs
pub fn company_from_ats(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    let first_segment = url
        .path_segments()
        .and_then(|mut s| s.find(|seg| !seg.is_empty()))
        .map(str::to_string);

    let slug = if host.ends_with("greenhouse.io") || host == "jobs.lever.co" || host == "apply.workable.com" {
        first_segment?
    } else if let Some(sub) = host.strip_suffix(".workable.com") {
        sub.to_string()
    } else if let Some(sub) = host.strip_suffix(".bamboohr.com") {
        sub.to_string()
    } else {
        return None;
    };
    Some(title_case(&slug))
}

/// Employer guessed from the host name ("careers.acme-corp.com" → "Acme Corp")
pub fn company_from_domain(url: &Url) -> Option<String> {
    let mut host = url.host_str()?.to_lowercase();
    if url.host().is_some_and(|h| !matches!(h, url::Host::Domain(_))) {
        return None;
    }
    if GENERIC_HOSTS
        .iter()
        .any(|g| host == *g || host.ends_with(&format!(".{}", g)))
    {
        return None;
    }
    for prefix in HOST_PREFIXES {
        if let Some(rest) = host.strip_prefix(prefix) {
            host = rest.to_string();
        }
    }
    let label = host.split('.').next().filter(|l| !l.is_empty())?;
    Some(title_case(label))
}

fn title_case(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
