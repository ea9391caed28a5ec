// src/resolver.rs
//! Selector fallback chains: first candidate whose first match is visible wins

use crate::browser::{ElementHandle, Locator, PageDriver};
use tracing::{debug, warn};

pub enum Resolution<'p> {
    Found(ElementHandle<'p>),
    NotFound,
}

impl<'p> Resolution<'p> {
    pub fn found(self) -> Option<ElementHandle<'p>> {
        match self {
            Resolution::Found(handle) => Some(handle),
            Resolution::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Read-only lookup over the current page. Retry policy belongs to the caller.
#[derive(Clone, Copy)]
pub struct SelectorResolver<'p> {
    page: &'p dyn PageDriver,
}

impl<'p> SelectorResolver<'p> {
    pub fn new(page: &'p dyn PageDriver) -> Self {
        Self { page }
    }

    pub async fn resolve<S: AsRef<str>>(&self, candidates: &[S]) -> Resolution<'p> {
        self.resolve_in(None, candidates).await
    }

    /// Same as `resolve`, searching only inside `scope`
    pub async fn resolve_within<S: AsRef<str>>(
        &self,
        scope: &Locator,
        candidates: &[S],
    ) -> Resolution<'p> {
        self.resolve_in(Some(scope), candidates).await
    }

    /// Text of the first resolvable candidate, when non-empty
    pub async fn text_of<S: AsRef<str>>(
        &self,
        scope: Option<&Locator>,
        candidates: &[S],
    ) -> Option<String> {
        let handle = self.resolve_in(scope, candidates).await.found()?;
        let text = handle.text().await.ok()?;
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    async fn resolve_in<S: AsRef<str>>(
        &self,
        scope: Option<&Locator>,
        candidates: &[S],
    ) -> Resolution<'p> {
        for (position, candidate) in candidates.iter().enumerate() {
            let selector = candidate.as_ref();
            let matched = match self.page.count(scope, selector).await {
                Ok(n) => n,
                Err(e) => {
                    debug!("Selector '{}' could not be counted: {}", selector, e);
                    continue;
                }
            };
            if matched == 0 {
                continue;
            }

            let mut locator = Locator::new(selector);
            if let Some(scope) = scope {
                locator = locator.within(scope);
            }

            if !self.page.is_visible(&locator).await.unwrap_or(false) {
                debug!("Selector '{}' matched only an invisible element", selector);
                continue;
            }

            if matched > 1 {
                warn!(
                    "Selector '{}' matched {} elements, using the first",
                    selector, matched
                );
            }
            if position > 0 {
                debug!("Resolved via fallback candidate #{}: {}", position, selector);
            }
            return Resolution::Found(ElementHandle::new(self.page, locator, matched));
        }

        Resolution::NotFound
    }
}
