// src/browser/fetcher.rs
//! Canned document transport behind the `HttpPage` test double

use crate::errors::BrowserError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub form: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            method: Method::Get,
            form: Vec::new(),
            timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, BrowserError>;
}

/// Serves registered documents by URL; used for replaying captured pages
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(Self::key(url), html.to_string());
        self
    }

    /// Requests for `url` fail as if the navigation timed out
    pub fn with_failure(mut self, url: &str) -> Self {
        self.failing.insert(Self::key(url));
        self
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn key(url: &str) -> String {
        match Url::parse(url) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, BrowserError> {
        let key = Self::key(request.url.as_str());
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(key.clone());
        }

        if self.failing.contains(&key) {
            return Err(BrowserError::Timeout {
                what: format!("loading {}", key),
                after: request.timeout,
            });
        }

        match self.pages.get(&key) {
            Some(body) => Ok(FetchedPage {
                url: request.url.clone(),
                body: body.clone(),
            }),
            None => Err(BrowserError::Navigation {
                url: key,
                reason: "HTTP error: 404 Not Found".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_fetcher_serves_registered_pages() {
        let fetcher = StaticFetcher::new().with_page("https://jobs.test", "<p>hi</p>");
        let url = Url::parse("https://jobs.test/#top").unwrap();
        let page = fetcher
            .fetch(&FetchRequest::get(url, Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(page.body, "<p>hi</p>");
        assert_eq!(fetcher.requests(), vec!["https://jobs.test/".to_string()]);
    }

    #[tokio::test]
    async fn test_static_fetcher_failures() {
        let fetcher = StaticFetcher::new().with_failure("https://slow.test/job");
        let url = Url::parse("https://slow.test/job").unwrap();
        let err = fetcher
            .fetch(&FetchRequest::get(url, Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Timeout { .. }));

        let missing = Url::parse("https://jobs.test/missing").unwrap();
        let err = fetcher
            .fetch(&FetchRequest::get(missing, Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Navigation { .. }));
    }
}
