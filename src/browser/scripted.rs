// src/browser/scripted.rs
//! `HttpPage` wrapper for tests: injects click failures and observes navigations

use super::{BoundingBox, HttpPage, Key, Locator, NavigateOptions, PageDriver};
use crate::errors::BrowserError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

type NavigationHook<'a> = Box<dyn Fn(&str) + Send + Sync + 'a>;

pub struct ScriptedPage<'a> {
    inner: HttpPage,
    click_failures: HashMap<String, BrowserError>,
    on_navigate: Option<NavigationHook<'a>>,
}

impl<'a> ScriptedPage<'a> {
    pub fn new(inner: HttpPage) -> Self {
        Self {
            inner,
            click_failures: HashMap::new(),
            on_navigate: None,
        }
    }

    /// Every click on the locator displayed as `locator` fails with `error`
    pub fn fail_click(mut self, locator: &str, error: BrowserError) -> Self {
        self.click_failures.insert(locator.to_string(), error);
        self
    }

    /// Called with the new URL after each navigation
    pub fn on_navigate(mut self, hook: impl Fn(&str) + Send + Sync + 'a) -> Self {
        self.on_navigate = Some(Box::new(hook));
        self
    }

    fn navigated(&self) {
        if let Some(hook) = &self.on_navigate {
            hook(&self.inner.current_url());
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedPage<'_> {
    async fn goto(&self, url: &str, options: &NavigateOptions) -> Result<(), BrowserError> {
        self.inner.goto(url, options).await?;
        self.navigated();
        Ok(())
    }

    async fn go_back(&self) -> Result<(), BrowserError> {
        self.inner.go_back().await?;
        self.navigated();
        Ok(())
    }

    fn current_url(&self) -> String {
        self.inner.current_url()
    }

    async fn count(&self, scope: Option<&Locator>, selector: &str) -> Result<usize, BrowserError> {
        self.inner.count(scope, selector).await
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
        self.inner.is_visible(locator).await
    }

    async fn text(&self, locator: &Locator) -> Result<String, BrowserError> {
        self.inner.text(locator).await
    }

    async fn attribute(
        &self,
        locator: &Locator,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.inner.attribute(locator, name).await
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        if let Some(error) = self.click_failures.get(&locator.to_string()) {
            return Err(error.clone());
        }
        let before = self.inner.current_url();
        self.inner.click(locator).await?;
        if self.inner.current_url() != before {
            self.navigated();
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        self.inner.fill(locator, value).await
    }

    async fn press(&self, key: Key) -> Result<(), BrowserError> {
        self.inner.press(key).await
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>, BrowserError> {
        self.inner.bounding_box(locator).await
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.inner.click_at(x, y).await
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.inner.wait_for_load(timeout).await
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.inner.title().await
    }
}
