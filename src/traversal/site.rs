// src/traversal/site.rs
//! Per-site selector chains. Every site implements the same traversal
//! contract; only these lists differ.

use crate::interstitial::InterstitialSelectors;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SiteProfile {
    pub name: String,
    pub base_url: String,
    pub description: String,

    /// Page holding the search form
    pub search_url: String,
    /// Direct results URL used when the form cannot be driven.
    /// `{keywords}` and `{location}` are replaced URL-encoded.
    pub results_url: Option<String>,
    pub keyword_input: Vec<String>,
    pub location_input: Vec<String>,
    pub submit: Vec<String>,
    /// Query parameter carrying the max-age filter, as `name=value` where
    /// the value may contain `{seconds}` or `{days}`
    pub max_age_param: Option<String>,

    pub card_container: Vec<String>,
    pub card_link: Vec<String>,
    /// Attributes naming the posting, read from the card or a descendant
    /// when the card has no usable link
    pub card_id: Vec<String>,
    pub card_title: Vec<String>,
    pub card_company: Vec<String>,
    pub card_location: Vec<String>,
    pub card_snippet: Vec<String>,
    pub card_posted: Vec<String>,

    pub detail_title: Vec<String>,
    pub detail_company: Vec<String>,
    pub detail_location: Vec<String>,
    pub detail_description: Vec<String>,
    pub detail_skills: Vec<String>,
    pub detail_posted: Vec<String>,

    /// Label-based, then relation-based, then class-based controls
    pub next_page: Vec<String>,

    pub interstitials: InterstitialSelectors,
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SiteProfile {
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "linkedin" => Some(Self::linkedin()),
            "indeed" => Some(Self::indeed()),
            _ => None,
        }
    }

    pub fn builtins() -> Vec<Self> {
        vec![Self::linkedin(), Self::indeed()]
    }

    pub fn linkedin() -> Self {
        Self {
            name: "linkedin".to_string(),
            base_url: "https://www.linkedin.com".to_string(),
            description: "LinkedIn job search".to_string(),
            search_url: "https://www.linkedin.com/jobs/search/".to_string(),
            results_url: Some(
                "https://www.linkedin.com/jobs/search/?keywords={keywords}&location={location}"
                    .to_string(),
            ),
            keyword_input: list(&[
                "input[name='keywords']",
                "input#job-search-bar-keywords",
                "input.jobs-search-box__text-input[aria-label*='title']",
                "input[aria-label*='Search job titles']",
            ]),
            location_input: list(&[
                "input[name='location']",
                "input#job-search-bar-location",
                "input.jobs-search-box__text-input[aria-label*='location']",
                "input[aria-label*='City']",
            ]),
            submit: list(&[
                "button.base-search-bar__submit-btn",
                "button.jobs-search-box__submit-button",
                "form button[type='submit']",
            ]),
            max_age_param: Some("f_TPR=r{seconds}".to_string()),
            card_container: list(&[
                "ul.jobs-search__results-list > li",
                "li.jobs-search-results__list-item",
                "li[data-occludable-job-id]",
                "div.job-search-card",
            ]),
            card_link: list(&[
                "a.base-card__full-link",
                "a.job-card-list__title",
                "a.job-card-container__link",
                "a[href*='/jobs/view/']",
            ]),
            card_id: list(&["data-entity-urn", "data-job-id", "data-occludable-job-id"]),
            card_title: list(&[
                "h3.base-search-card__title",
                ".job-card-list__title",
                ".artdeco-entity-lockup__title",
                "h3",
            ]),
            card_company: list(&[
                "h4.base-search-card__subtitle",
                ".job-card-container__primary-description",
                ".artdeco-entity-lockup__subtitle",
                "h4",
            ]),
            card_location: list(&[
                ".job-search-card__location",
                ".job-card-container__metadata-item",
                ".artdeco-entity-lockup__caption",
            ]),
            card_snippet: list(&[".job-search-card__snippet", ".base-search-card__metadata"]),
            card_posted: list(&[
                "time.job-search-card__listdate--new",
                "time.job-search-card__listdate",
                "time",
            ]),
            detail_title: list(&[
                "h1.top-card-layout__title",
                ".job-details-jobs-unified-top-card__job-title",
                "h1[data-test-id='job-title']",
                ".jobs-unified-top-card__job-title",
            ]),
            detail_company: list(&[
                ".job-details-jobs-unified-top-card__company-name",
                "a.topcard__org-name-link",
                ".top-card-layout__card .top-card-layout__second-subline",
                "a[data-test-id='job-poster-name']",
                ".jobs-unified-top-card__company-name",
            ]),
            detail_location: list(&[
                ".job-details-jobs-unified-top-card__bullet",
                ".topcard__flavor--bullet",
                ".top-card-layout__card .top-card-layout__first-subline",
                "[data-test-id='job-location']",
                ".jobs-unified-top-card__bullet",
            ]),
            detail_description: list(&[
                ".show-more-less-html__markup",
                ".jobs-box__html-content",
                ".jobs-description__container",
                ".jobs-description-content__text",
                "[data-test-id='job-description']",
            ]),
            detail_skills: list(&[
                ".job-details-skill-match-status-list",
                ".job-details-how-you-match__skills-item-subtitle",
            ]),
            detail_posted: list(&[
                "span.posted-time-ago__text",
                ".jobs-unified-top-card__posted-date",
                "time",
            ]),
            next_page: list(&[
                "button[aria-label='Next']",
                "a[aria-label='Next']",
                "button[aria-label='View next page']",
                "a[rel='next']",
                "li.artdeco-pagination__indicator--number.active + li button",
                ".artdeco-pagination__button--next",
            ]),
            interstitials: InterstitialSelectors::default(),
        }
    }

    pub fn indeed() -> Self {
        Self {
            name: "indeed".to_string(),
            base_url: "https://www.indeed.com".to_string(),
            description: "Indeed job board".to_string(),
            search_url: "https://www.indeed.com/".to_string(),
            results_url: Some("https://www.indeed.com/jobs?q={keywords}&l={location}".to_string()),
            keyword_input: list(&["input#text-input-what", "input[name='q']"]),
            location_input: list(&["input#text-input-where", "input[name='l']"]),
            submit: list(&[
                "button.yosegi-InlineWhatWhere-primaryButton",
                "button[type='submit']",
            ]),
            max_age_param: Some("fromage={days}".to_string()),
            card_container: list(&[
                "div.job_seen_beacon",
                "li div.cardOutline",
                "ul.jobsearch-ResultsList > li",
                "div.jobsearch-SerpJobCard",
            ]),
            card_link: list(&[
                "h2.jobTitle a",
                "a.jcs-JobTitle",
                "a[data-jk]",
                "a[href*='/rc/clk']",
                "a[href*='viewjob']",
            ]),
            card_id: list(&["data-jk"]),
            card_title: list(&["h2.jobTitle span[title]", "h2.jobTitle", ".jobTitle"]),
            card_company: list(&[
                "[data-testid='company-name']",
                "span.companyName",
                ".company",
            ]),
            card_location: list(&[
                "[data-testid='text-location']",
                "div.companyLocation",
                ".location",
            ]),
            card_snippet: list(&["div.job-snippet", "[data-testid='jobsnippet_footer']", ".summary"]),
            card_posted: list(&["span.date", "[data-testid='myJobsStateDate']"]),
            detail_title: list(&[
                "h1.jobsearch-JobInfoHeader-title",
                "[data-testid='jobsearch-JobInfoHeader-title']",
                "h1",
            ]),
            detail_company: list(&[
                "[data-testid='inlineHeader-companyName']",
                "[data-company-name='true']",
                "div.jobsearch-CompanyInfoContainer a",
                ".jobsearch-InlineCompanyRating div",
            ]),
            detail_location: list(&[
                "[data-testid='inlineHeader-companyLocation']",
                "[data-testid='job-location']",
                ".jobsearch-JobInfoHeader-subtitle > div:last-child",
            ]),
            detail_description: list(&["#jobDescriptionText", ".jobsearch-jobDescriptionText"]),
            detail_skills: list(&["[data-testid='skills-list']", "#qualificationsSection ul"]),
            detail_posted: list(&[
                "[data-testid='myJobsStateDate']",
                ".jobsearch-JobMetadataFooter span",
            ]),
            next_page: list(&[
                "a[aria-label='Next Page']",
                "a[aria-label='Next']",
                "a[rel='next']",
                "a[data-testid='pagination-page-next']",
                "nav[role='navigation'] a.next",
            ]),
            interstitials: InterstitialSelectors::default(),
        }
    }

    /// Direct results URL for a query, when the profile declares one
    pub fn results_url_for(&self, keywords: &str, location: &str) -> Option<String> {
        let template = self.results_url.as_ref()?;
        let encode = |value: &str| {
            url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>()
        };
        Some(
            template
                .replace("{keywords}", &encode(keywords))
                .replace("{location}", &encode(location)),
        )
    }

    /// Adds the max-age filter to a results URL. Unknown templates leave the
    /// URL untouched.
    pub fn apply_max_age(&self, results_url: &str, max_age_secs: u64) -> String {
        let Some(template) = &self.max_age_param else {
            return results_url.to_string();
        };
        let Some((name, value)) = template.split_once('=') else {
            return results_url.to_string();
        };
        let Ok(mut url) = Url::parse(results_url) else {
            return results_url.to_string();
        };

        let days = max_age_secs.div_ceil(86_400).max(1);
        let value = value
            .replace("{seconds}", &max_age_secs.to_string())
            .replace("{days}", &days.to_string());

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != name)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter())
            .append_pair(name, &value);
        url.to_string()
    }

    /// Same host as the origin site, ignoring a leading `www.`
    pub fn is_same_origin(&self, candidate: &Url) -> bool {
        let Ok(base) = Url::parse(&self.base_url) else {
            return false;
        };
        let strip = |host: &str| host.trim_start_matches("www.").to_string();
        match (base.host_str(), candidate.host_str()) {
            (Some(a), Some(b)) => strip(a) == strip(b) || b.ends_with(&format!(".{}", strip(a))),
            _ => false,
        }
    }
}
