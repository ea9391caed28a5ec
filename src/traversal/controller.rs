// src/traversal/controller.rs
//! Listing traversal state machine. All progress lives in an explicit
//! `TraversalContext` that each step consumes and returns.

use super::external::extract_external;
use super::site::SiteProfile;
use crate::browser::{ElementHandle, Key, Locator, NavigateOptions, PageDriver};
use crate::errors::{BrowserError, TraversalError};
use crate::interstitial::{DismissOutcome, InterstitialHandler};
use crate::normalize::{self, CaptureOrigin, RawCapture};
use crate::resolver::SelectorResolver;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraversalLimits {
    /// Wall-clock budget for one search run
    pub run_budget_secs: u64,
    pub card_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub external_timeout_secs: u64,
    pub max_pages: usize,
    pub max_card_failures: usize,
    pub discovery_attempts: usize,
    pub retry_delay_ms: u64,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            run_budget_secs: 900,
            card_timeout_secs: 45,
            navigation_timeout_secs: 30,
            external_timeout_secs: 60,
            max_pages: 10,
            max_card_failures: 15,
            discovery_attempts: 3,
            retry_delay_ms: 750,
        }
    }
}

impl TraversalLimits {
    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_secs)
    }

    pub fn card_timeout(&self) -> Duration {
        Duration::from_secs(self.card_timeout_secs)
    }

    pub fn navigation(&self) -> NavigateOptions {
        NavigateOptions::with_timeout(Duration::from_secs(self.navigation_timeout_secs))
    }

    pub fn external(&self) -> NavigateOptions {
        NavigateOptions::external(Duration::from_secs(self.external_timeout_secs))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub keywords: String,
    pub location: String,
    /// Maximum posting age in seconds
    pub max_age: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    SearchSubmitted,
    CardsDiscovered,
    CardOpened,
    CardExtracted,
    NextCard,
    NextPage,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardFailure {
    pub page: usize,
    pub card_index: usize,
    pub reason: String,
}

/// Card summary plus the detail view capture, awaiting the extraction decision
#[derive(Debug, Clone)]
pub struct PendingCard {
    pub summary: RawCapture,
    pub detail: Option<RawCapture>,
}

#[derive(Debug)]
pub struct TraversalContext {
    pub state: TraversalState,
    /// 1-based page number
    pub page: usize,
    pub card_index: usize,
    pub card_count: usize,
    pub card_selector: Option<String>,
    pub results_url: String,
    pub visited_pages: HashSet<String>,
    pub pending: Option<PendingCard>,
    pub captures: Vec<RawCapture>,
    pub failures: Vec<CardFailure>,
    pub pages_visited: usize,
    pub cards_seen: usize,
    pub fault: Option<TraversalError>,
    pub budget_exhausted: bool,
    pub deadline: Instant,
}

impl TraversalContext {
    pub fn new(results_url: String, deadline: Instant) -> Self {
        Self {
            state: TraversalState::SearchSubmitted,
            page: 1,
            card_index: 0,
            card_count: 0,
            card_selector: None,
            visited_pages: HashSet::from([results_url.clone()]),
            results_url,
            pending: None,
            captures: Vec::new(),
            failures: Vec::new(),
            pages_visited: 0,
            cards_seen: 0,
            fault: None,
            budget_exhausted: false,
            deadline,
        }
    }

    fn transition(&mut self, next: TraversalState) {
        debug!(
            "Traversal {:?} -> {:?} (page {}, card {})",
            self.state, next, self.page, self.card_index
        );
        self.state = next;
    }

    fn fail(&mut self, fault: TraversalError) {
        error!("Traversal stopped: {}", fault);
        self.fault = Some(fault);
        self.transition(TraversalState::Exhausted);
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Everything a finished traversal produced
#[derive(Debug, Default)]
pub struct TraversalOutcome {
    pub captures: Vec<RawCapture>,
    pub failures: Vec<CardFailure>,
    pub pages_visited: usize,
    pub cards_seen: usize,
    pub fault: Option<TraversalError>,
    pub budget_exhausted: bool,
}

impl From<TraversalContext> for TraversalOutcome {
    fn from(ctx: TraversalContext) -> Self {
        Self {
            captures: ctx.captures,
            failures: ctx.failures,
            pages_visited: ctx.pages_visited,
            cards_seen: ctx.cards_seen,
            fault: ctx.fault,
            budget_exhausted: ctx.budget_exhausted,
        }
    }
}

/// Receives the captures of one results page at a time
#[async_trait]
pub trait PageSink: Send {
    async fn page_done(&mut self, captures: Vec<RawCapture>) -> anyhow::Result<()>;
}

#[async_trait]
impl PageSink for Vec<RawCapture> {
    async fn page_done(&mut self, captures: Vec<RawCapture>) -> anyhow::Result<()> {
        self.extend(captures);
        Ok(())
    }
}

enum CardError {
    /// The card could not be clicked because it is not there any more
    Gone(String),
    Failed(String),
}

/// Drives one search run on one page, strictly one interaction at a time
pub struct ListingTraversal<'a> {
    page: &'a dyn PageDriver,
    profile: &'a SiteProfile,
    limits: &'a TraversalLimits,
}

impl<'a> ListingTraversal<'a> {
    pub fn new(page: &'a dyn PageDriver, profile: &'a SiteProfile, limits: &'a TraversalLimits) -> Self {
        Self {
            page,
            profile,
            limits,
        }
    }

    /// Runs to completion and returns every capture in the outcome
    pub async fn run(&self, params: &SearchParams) -> TraversalOutcome {
        let mut captures = Vec::new();
        // collecting into memory never fails
        let mut outcome = self
            .run_paged(params, &mut captures)
            .await
            .unwrap_or_default();
        outcome.captures = captures;
        outcome
    }

    /// Runs to completion, handing each results page's captures to `sink`
    /// as soon as the traversal leaves that page. The returned outcome
    /// carries no captures. A sink error stops the traversal.
    pub async fn run_paged(
        &self,
        params: &SearchParams,
        sink: &mut dyn PageSink,
    ) -> anyhow::Result<TraversalOutcome> {
        let deadline = Instant::now() + self.limits.run_budget();

        let mut ctx = match self.submit_search(params).await {
            Ok(results_url) => {
                info!("Search submitted on {}: {}", self.profile.name, results_url);
                TraversalContext::new(results_url, deadline)
            }
            Err(fault) => {
                let mut ctx = TraversalContext::new(self.page.current_url(), deadline);
                ctx.fail(fault);
                ctx
            }
        };

        let mut delivered = 0;
        while ctx.state != TraversalState::Exhausted {
            ctx = self.step(ctx).await;
            let leaving_page = matches!(
                ctx.state,
                TraversalState::NextPage | TraversalState::Exhausted
            );
            if leaving_page && !ctx.captures.is_empty() {
                let batch = std::mem::take(&mut ctx.captures);
                delivered += batch.len();
                debug!("Handing over {} captures from page {}", batch.len(), ctx.page);
                sink.page_done(batch).await?;
            }
        }

        info!(
            "Traversal of {} finished: {} pages, {} cards, {} captures, {} failures",
            self.profile.name,
            ctx.pages_visited,
            ctx.cards_seen,
            delivered,
            ctx.failures.len()
        );
        Ok(ctx.into())
    }

    /// Performs one transition
    pub async fn step(&self, mut ctx: TraversalContext) -> TraversalContext {
        match ctx.state {
            TraversalState::SearchSubmitted => match self.discover_cards(&ctx.results_url).await {
                Some((selector, count)) => {
                    ctx.card_selector = Some(selector);
                    ctx.card_count = count;
                    ctx.pages_visited += 1;
                    ctx.transition(TraversalState::CardsDiscovered);
                }
                None => ctx.fail(TraversalError::NoCards {
                    url: ctx.results_url.clone(),
                }),
            },

            TraversalState::CardsDiscovered => {
                ctx.card_index = 0;
                ctx.transition(TraversalState::CardOpened);
            }

            TraversalState::CardOpened => self.open_card(&mut ctx).await,

            TraversalState::CardExtracted => {
                if let Some(pending) = ctx.pending.take() {
                    let capture = choose_capture(pending);
                    if has_identity(&capture, &ctx.results_url) {
                        ctx.captures.push(capture);
                    } else {
                        warn!(
                            "Card {} on page {} has no link or id, skipping",
                            ctx.card_index, ctx.page
                        );
                        ctx.failures.push(CardFailure {
                            page: ctx.page,
                            card_index: ctx.card_index,
                            reason: "card has no link or id".to_string(),
                        });
                    }
                }
                ctx.transition(TraversalState::NextCard);
            }

            TraversalState::NextCard => {
                ctx.card_index += 1;
                if ctx.failures.len() >= self.limits.max_card_failures {
                    let count = ctx.failures.len();
                    ctx.fail(TraversalError::TooManyCardFailures(count));
                } else if ctx.remaining().is_zero() {
                    warn!("Run budget exhausted on page {}", ctx.page);
                    ctx.budget_exhausted = true;
                    ctx.transition(TraversalState::Exhausted);
                } else {
                    ctx.transition(TraversalState::CardOpened);
                }
            }

            TraversalState::NextPage => self.next_page(&mut ctx).await,

            TraversalState::Exhausted => {}
        }
        ctx
    }

    // ===== Search entry =====

    async fn submit_search(&self, params: &SearchParams) -> Result<String, TraversalError> {
        let nav = self.limits.navigation();
        let resolver = SelectorResolver::new(self.page);

        let mut submitted = false;
        match self.page.goto(&self.profile.search_url, &nav).await {
            Ok(()) => {
                self.dismiss_interstitials().await;
                if let Some(input) = resolver.resolve(&self.profile.keyword_input).await.found() {
                    submitted = self.fill_and_submit(&input, params).await;
                }
            }
            Err(e) => warn!("Search page {} unavailable: {}", self.profile.search_url, e),
        }

        if !submitted {
            let direct = self
                .profile
                .results_url_for(&params.keywords, &params.location)
                .ok_or_else(|| {
                    TraversalError::SearchFormUnavailable(self.profile.search_url.clone())
                })?;
            debug!("Search form not usable, opening results directly: {}", direct);
            self.page
                .goto(&direct, &nav)
                .await
                .map_err(|e| TraversalError::SearchFormUnavailable(e.to_string()))?;
        }

        if let Some(max_age) = params.max_age {
            let current = self.page.current_url();
            let filtered = self.profile.apply_max_age(&current, max_age);
            if filtered != current {
                self.page
                    .goto(&filtered, &nav)
                    .await
                    .map_err(|e| TraversalError::SearchFormUnavailable(e.to_string()))?;
            }
        }

        Ok(self.page.current_url())
    }

    async fn fill_and_submit(
        &self,
        keyword_input: &ElementHandle<'_>,
        params: &SearchParams,
    ) -> bool {
        let resolver = SelectorResolver::new(self.page);
        if let Err(e) = keyword_input.fill(&params.keywords).await {
            warn!("Keyword input not fillable: {}", e);
            return false;
        }
        if !params.location.is_empty() {
            match resolver.resolve(&self.profile.location_input).await.found() {
                Some(input) => {
                    if let Err(e) = input.fill(&params.location).await {
                        debug!("Location input not fillable: {}", e);
                    }
                }
                None => debug!("No location input on {}", self.profile.name),
            }
        }

        let before = self.page.current_url();
        let result = match resolver.resolve(&self.profile.submit).await.found() {
            Some(button) => button.click().await,
            None => self.page.press(Key::Enter).await,
        };
        if let Err(e) = result {
            warn!("Search submit failed: {}", e);
            return false;
        }
        let _ = self
            .page
            .wait_for_load(self.limits.navigation().timeout)
            .await;
        self.page.current_url() != before
    }

    // ===== Cards =====

    /// First visible card container, retried with waits between attempts
    async fn discover_cards(&self, url: &str) -> Option<(String, usize)> {
        let resolver = SelectorResolver::new(self.page);
        let attempts = self.limits.discovery_attempts.max(1);

        for attempt in 1..=attempts {
            self.dismiss_interstitials().await;
            if let Some(handle) = resolver.resolve(&self.profile.card_container).await.found() {
                let selector = handle.selector().to_string();
                let count = self
                    .page
                    .count(None, &selector)
                    .await
                    .unwrap_or(handle.match_count());
                debug!("Discovered {} cards on {} via {}", count, url, selector);
                return Some((selector, count));
            }
            if attempt < attempts {
                debug!("No cards on {} yet (attempt {}/{})", url, attempt, attempts);
                tokio::time::sleep(self.limits.retry_delay()).await;
                let _ = self
                    .page
                    .wait_for_load(self.limits.navigation().timeout)
                    .await;
            }
        }
        None
    }

    async fn open_card(&self, ctx: &mut TraversalContext) {
        let Some(selector) = ctx.card_selector.clone() else {
            ctx.transition(TraversalState::NextPage);
            return;
        };

        self.dismiss_interstitials().await;

        // The list can grow or shrink while it is being walked
        if let Ok(count) = self.page.count(None, &selector).await {
            ctx.card_count = count;
        }
        if ctx.card_index >= ctx.card_count {
            debug!("End of list on page {} at card {}", ctx.page, ctx.card_index);
            ctx.transition(TraversalState::NextPage);
            return;
        }

        let remaining = ctx.remaining();
        if remaining.is_zero() {
            ctx.budget_exhausted = true;
            ctx.transition(TraversalState::Exhausted);
            return;
        }
        let limit = self.limits.card_timeout().min(remaining);

        let card = Locator::nth(selector, ctx.card_index);
        ctx.cards_seen += 1;
        let (summary, link) = self.capture_summary(&card, ctx).await;

        let opened = tokio::time::timeout(limit, self.open_detail(&card, link.as_ref(), ctx)).await;
        let outcome = match opened {
            Ok(result) => result,
            Err(_) => Err(CardError::Failed(format!("timed out after {:?}", limit))),
        };

        match outcome {
            Ok(mut detail) => {
                if summary.card_id.is_some() {
                    detail.card_id = summary.card_id.clone();
                }
                ctx.pending = Some(PendingCard {
                    summary,
                    detail: Some(detail),
                });
                ctx.transition(TraversalState::CardExtracted);
            }
            Err(CardError::Gone(reason)) if ctx.card_index > 0 => {
                debug!(
                    "Card {} on page {} is gone ({}), treating as end of list",
                    ctx.card_index, ctx.page, reason
                );
                ctx.cards_seen -= 1;
                ctx.transition(TraversalState::NextPage);
            }
            Err(CardError::Gone(reason)) | Err(CardError::Failed(reason)) => {
                self.restore_results(&ctx.results_url).await;
                if ctx.card_index == 0 {
                    ctx.fail(TraversalError::FirstCardFailed {
                        page: ctx.page,
                        reason,
                    });
                    return;
                }
                warn!("Card {} on page {} failed: {}", ctx.card_index, ctx.page, reason);
                ctx.failures.push(CardFailure {
                    page: ctx.page,
                    card_index: ctx.card_index,
                    reason,
                });
                if has_identity(&summary, &ctx.results_url) {
                    ctx.pending = Some(PendingCard {
                        summary,
                        detail: None,
                    });
                }
                ctx.transition(TraversalState::CardExtracted);
            }
        }
    }

    /// Reduced record read from the listing card, plus its detail link.
    /// Linkless cards are named by their id attribute instead.
    async fn capture_summary(&self, card: &Locator, ctx: &TraversalContext) -> (RawCapture, Option<Url>) {
        let resolver = SelectorResolver::new(self.page);
        let profile = self.profile;

        let link = match resolver.resolve_within(card, &profile.card_link).await.found() {
            Some(anchor) => anchor.attribute("href").await.ok().flatten(),
            None => self.page.attribute(card, "href").await.ok().flatten(),
        };
        let link = link.and_then(|href| {
            Url::parse(&ctx.results_url)
                .ok()
                .and_then(|base| base.join(href.trim()).ok())
        });

        let card_id = if link.is_some() {
            None
        } else {
            self.card_id(card).await
        };

        let capture = RawCapture {
            origin: CaptureOrigin::CardSummary,
            title: resolver.text_of(Some(card), &profile.card_title).await,
            company: resolver.text_of(Some(card), &profile.card_company).await,
            location: resolver.text_of(Some(card), &profile.card_location).await,
            details: resolver.text_of(Some(card), &profile.card_snippet).await,
            skills: None,
            posted: self.posted_text(Some(card), &profile.card_posted).await,
            url: link
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| ctx.results_url.clone()),
            card_id,
            page: ctx.page,
            card_index: ctx.card_index,
        };
        (capture, link)
    }

    /// First configured id attribute on the card, then on a descendant
    async fn card_id(&self, card: &Locator) -> Option<String> {
        for name in &self.profile.card_id {
            let nested = Locator::new(format!("[{}]", name)).within(card);
            for target in [card, &nested] {
                if let Ok(Some(value)) = self.page.attribute(target, name).await {
                    if !value.trim().is_empty() {
                        return Some(value.trim().to_string());
                    }
                }
            }
        }
        None
    }

    async fn open_detail(
        &self,
        card: &Locator,
        link: Option<&Url>,
        ctx: &TraversalContext,
    ) -> Result<RawCapture, CardError> {
        match link {
            Some(url) if !self.profile.is_same_origin(url) => {
                self.open_external(url, ctx).await
            }
            _ => self.open_internal(card, link, ctx).await,
        }
    }

    /// Same-origin detail: click in place, extract, then go back
    async fn open_internal(
        &self,
        card: &Locator,
        link: Option<&Url>,
        ctx: &TraversalContext,
    ) -> Result<RawCapture, CardError> {
        let resolver = SelectorResolver::new(self.page);
        let target = match resolver.resolve_within(card, &self.profile.card_link).await.found() {
            Some(anchor) => anchor.locator().clone(),
            None => card.clone(),
        };

        let before = self.page.current_url();
        self.page.click(&target).await.map_err(|e| match e {
            BrowserError::ElementNotFound(_) | BrowserError::NotInteractable(_) => {
                CardError::Gone(e.to_string())
            }
            other => CardError::Failed(other.to_string()),
        })?;
        let _ = self
            .page
            .wait_for_load(self.limits.navigation().timeout)
            .await;
        self.dismiss_interstitials().await;

        let mut capture = self.capture_detail(ctx).await;
        capture.url = link
            .map(|u| u.to_string())
            .unwrap_or_else(|| self.page.current_url());

        if self.page.current_url() != before {
            let back = self.page.go_back().await;
            if back.is_err() || self.page.current_url() != ctx.results_url {
                debug!("History did not return to results, reloading {}", ctx.results_url);
                self.page
                    .goto(&ctx.results_url, &self.limits.navigation())
                    .await
                    .map_err(|e| CardError::Failed(format!("could not return to results: {}", e)))?;
            }
        }
        Ok(capture)
    }

    /// Third-party detail: navigate directly, then reload the stored results URL
    async fn open_external(&self, url: &Url, ctx: &TraversalContext) -> Result<RawCapture, CardError> {
        debug!("Opening external posting {}", url);
        let visited = self.page.goto(url.as_str(), &self.limits.external()).await;

        let capture = match visited {
            Ok(()) => {
                let _ = self
                    .page
                    .wait_for_load(self.limits.external().timeout)
                    .await;
                self.dismiss_interstitials().await;
                let mut capture = extract_external(self.page, url.as_str()).await;
                capture.page = ctx.page;
                capture.card_index = ctx.card_index;
                Ok(capture)
            }
            Err(e) => Err(CardError::Failed(format!("external page {}: {}", url, e))),
        };

        self.page
            .goto(&ctx.results_url, &self.limits.navigation())
            .await
            .map_err(|e| CardError::Failed(format!("could not return to results: {}", e)))?;
        capture
    }

    async fn capture_detail(&self, ctx: &TraversalContext) -> RawCapture {
        let resolver = SelectorResolver::new(self.page);
        let profile = self.profile;
        RawCapture {
            origin: CaptureOrigin::Detail,
            title: resolver.text_of(None, &profile.detail_title).await,
            company: resolver.text_of(None, &profile.detail_company).await,
            location: resolver.text_of(None, &profile.detail_location).await,
            details: resolver.text_of(None, &profile.detail_description).await,
            skills: resolver.text_of(None, &profile.detail_skills).await,
            posted: self.posted_text(None, &profile.detail_posted).await,
            url: String::new(),
            card_id: None,
            page: ctx.page,
            card_index: ctx.card_index,
        }
    }

    /// Prefers a machine-readable `datetime` attribute over display text
    async fn posted_text(&self, scope: Option<&Locator>, candidates: &[String]) -> Option<String> {
        let resolver = SelectorResolver::new(self.page);
        let resolution = match scope {
            Some(scope) => resolver.resolve_within(scope, candidates).await,
            None => resolver.resolve(candidates).await,
        };
        let handle = resolution.found()?;
        if let Ok(Some(datetime)) = handle.attribute("datetime").await {
            if !datetime.trim().is_empty() {
                return Some(datetime.trim().to_string());
            }
        }
        handle
            .text()
            .await
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    async fn restore_results(&self, results_url: &str) {
        if self.page.current_url() == results_url {
            return;
        }
        if let Err(e) = self.page.goto(results_url, &self.limits.navigation()).await {
            warn!("Could not restore results page {}: {}", results_url, e);
        }
    }

    // ===== Pagination =====

    async fn next_page(&self, ctx: &mut TraversalContext) {
        if ctx.pages_visited >= self.limits.max_pages {
            info!("Page limit {} reached", self.limits.max_pages);
            ctx.transition(TraversalState::Exhausted);
            return;
        }
        if ctx.remaining().is_zero() {
            ctx.budget_exhausted = true;
            ctx.transition(TraversalState::Exhausted);
            return;
        }

        self.restore_results(&ctx.results_url).await;
        self.dismiss_interstitials().await;

        let resolver = SelectorResolver::new(self.page);
        let Some(control) = resolver.resolve(&self.profile.next_page).await.found() else {
            debug!("No next-page control after page {}", ctx.page);
            ctx.transition(TraversalState::Exhausted);
            return;
        };

        if let Err(e) = control.click().await {
            warn!("Next-page control {} failed: {}", control.selector(), e);
            ctx.transition(TraversalState::Exhausted);
            return;
        }
        let _ = self
            .page
            .wait_for_load(self.limits.navigation().timeout)
            .await;

        let url = self.page.current_url();
        if !ctx.visited_pages.insert(url.clone()) {
            debug!("Next page {} was already visited", url);
            ctx.transition(TraversalState::Exhausted);
            return;
        }

        ctx.page += 1;
        ctx.results_url = url;
        match self.discover_cards(&ctx.results_url).await {
            Some((selector, count)) => {
                ctx.card_selector = Some(selector);
                ctx.card_count = count;
                ctx.pages_visited += 1;
                ctx.transition(TraversalState::CardsDiscovered);
            }
            None => {
                warn!("Page {} has no cards, stopping", ctx.page);
                ctx.transition(TraversalState::Exhausted);
            }
        }
    }

    async fn dismiss_interstitials(&self) -> DismissOutcome {
        let outcome = InterstitialHandler::new(self.page, &self.profile.interstitials)
            .dismiss()
            .await;
        if outcome.is_blocked() {
            debug!("Interstitial still blocking {}", self.page.current_url());
        }
        outcome
    }
}

/// Something other than the results page itself names the posting
fn has_identity(capture: &RawCapture, results_url: &str) -> bool {
    capture.card_id.is_some()
        || (!capture.url.is_empty()
            && normalize::canonical_url(&capture.url) != normalize::canonical_url(results_url))
}

/// Detail capture when it validates, otherwise the card summary
fn choose_capture(pending: PendingCard) -> RawCapture {
    let now = Utc::now();
    match pending.detail {
        Some(detail) => match normalize::normalize(&detail, now) {
            Ok(_) => detail,
            Err(e) => {
                debug!(
                    "Detail view of card {} incomplete ({}), using card summary",
                    detail.card_index, e
                );
                let mut summary = pending.summary;
                if summary.details.is_none() {
                    summary.details = detail.details;
                }
                summary
            }
        },
        None => pending.summary,
    }
}
