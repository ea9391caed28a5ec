// src/browser/element.rs
use super::{BoundingBox, Locator, PageDriver};
use crate::errors::BrowserError;
use crate::resolver::SelectorResolver;

/// A resolved element, detached from how it was resolved
pub struct ElementHandle<'p> {
    page: &'p dyn PageDriver,
    locator: Locator,
    matched: usize,
}

impl<'p> ElementHandle<'p> {
    pub fn new(page: &'p dyn PageDriver, locator: Locator, matched: usize) -> Self {
        Self {
            page,
            locator,
            matched,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Selector that produced this handle
    pub fn selector(&self) -> &str {
        &self.locator.selector
    }

    /// How many elements the winning selector matched when resolved
    pub fn match_count(&self) -> usize {
        self.matched
    }

    pub fn page(&self) -> &'p dyn PageDriver {
        self.page
    }

    pub async fn is_visible(&self) -> bool {
        self.page.is_visible(&self.locator).await.unwrap_or(false)
    }

    pub async fn text(&self) -> Result<String, BrowserError> {
        self.page.text(&self.locator).await
    }

    pub async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        self.page.attribute(&self.locator, name).await
    }

    pub async fn click(&self) -> Result<(), BrowserError> {
        self.page.click(&self.locator).await
    }

    pub async fn fill(&self, value: &str) -> Result<(), BrowserError> {
        self.page.fill(&self.locator, value).await
    }

    pub async fn bounding_box(&self) -> Result<Option<BoundingBox>, BrowserError> {
        self.page.bounding_box(&self.locator).await
    }

    /// First visible match of `candidates` inside this element
    pub async fn find<S: AsRef<str>>(&self, candidates: &[S]) -> Option<ElementHandle<'p>> {
        SelectorResolver::new(self.page)
            .resolve_within(&self.locator, candidates)
            .await
            .found()
    }
}

impl std::fmt::Debug for ElementHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("locator", &self.locator)
            .field("matched", &self.matched)
            .finish()
    }
}
