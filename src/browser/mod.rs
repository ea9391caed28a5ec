// src/browser/mod.rs
//! Page driving abstraction used by the traversal worker

pub mod chrome;
pub mod element;
#[cfg(test)]
pub mod fetcher;
#[cfg(test)]
pub mod http_page;
#[cfg(test)]
pub mod scripted;

pub use chrome::{BrowserSettings, ChromePage};
pub use element::ElementHandle;
#[cfg(test)]
pub use fetcher::StaticFetcher;
#[cfg(test)]
pub use http_page::HttpPage;
#[cfg(test)]
pub use scripted::ScriptedPage;

use crate::errors::BrowserError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Lazily resolved address of an element: the `nth` match of `selector`,
/// optionally searched inside another locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub selector: String,
    pub nth: usize,
    pub parent: Option<Box<Locator>>,
}

impl Locator {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            nth: 0,
            parent: None,
        }
    }

    pub fn nth(selector: impl Into<String>, nth: usize) -> Self {
        Self {
            nth,
            ..Self::new(selector)
        }
    }

    pub fn within(mut self, parent: &Locator) -> Self {
        self.parent = Some(Box::new(parent.clone()));
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{} >> ", parent)?;
        }
        write!(f, "{}[{}]", self.selector, self.nth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug, Clone)]
pub struct NavigateOptions {
    pub timeout: Duration,
    pub wait_until: WaitUntil,
}

impl NavigateOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            wait_until: WaitUntil::Load,
        }
    }

    /// Third-party detail pages are slower and heavier than the origin site
    pub fn external(timeout: Duration) -> Self {
        Self {
            timeout,
            wait_until: WaitUntil::NetworkIdle,
        }
    }
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_NAVIGATION_TIMEOUT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
}

/// One live, stateful page. Calls are issued one at a time by a single worker.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn goto(&self, url: &str, options: &NavigateOptions) -> Result<(), BrowserError>;

    async fn go_back(&self) -> Result<(), BrowserError>;

    fn current_url(&self) -> String;

    /// Number of matches for `selector`, searched inside `scope` when given
    async fn count(&self, scope: Option<&Locator>, selector: &str) -> Result<usize, BrowserError>;

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError>;

    async fn text(&self, locator: &Locator) -> Result<String, BrowserError>;

    async fn attribute(&self, locator: &Locator, name: &str)
        -> Result<Option<String>, BrowserError>;

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError>;

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError>;

    async fn press(&self, key: Key) -> Result<(), BrowserError>;

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>, BrowserError>;

    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError>;

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;
}
