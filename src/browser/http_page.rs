// src/browser/http_page.rs
//! Document-level test double for `PageDriver`: serves canned markup and
//! simulates the interactions the traversal needs (links, form submission,
//! overlay dismissal). It has no layout, so boxes are unknown and a click
//! at a point closes whatever overlay is open.

use super::fetcher::{FetchRequest, Fetcher, Method};
use super::{BoundingBox, Key, Locator, NavigateOptions, PageDriver};
use crate::errors::BrowserError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use url::Url;

type NodePath = Vec<usize>;

static OVERLAY: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "[role='dialog'], [role='alertdialog'], [aria-modal='true'], dialog, .modal, .overlay, \
         .popup, [class*='cookie'], [class*='consent'], [id*='cookie'], [id*='consent']",
    )
    .expect("overlay selector is valid")
});

static TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("title selector is valid"));

const NON_RENDERED: [&str; 7] = ["script", "style", "template", "noscript", "head", "meta", "link"];
const REPLACED: [&str; 9] = [
    "input", "button", "select", "textarea", "img", "svg", "iframe", "video", "canvas",
];

#[derive(Default)]
struct PageState {
    url: Option<Url>,
    html: String,
    history: Vec<Url>,
    form_values: HashMap<NodePath, String>,
    dismissed: HashSet<NodePath>,
    last_filled: Option<NodePath>,
}

enum ClickAction {
    Navigate(Url),
    Submit(FetchRequest),
    Dismiss(NodePath),
    Nothing,
}

pub struct HttpPage {
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<PageState>,
    timeout: Duration,
}

impl HttpPage {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            state: Mutex::new(PageState::default()),
            timeout: NavigateOptions::default().timeout,
        }
    }

    /// Timeout used for navigations triggered by clicks and form submits
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn navigate(&self, request: FetchRequest, push_history: bool) -> Result<(), BrowserError> {
        let fetched = self.fetcher.fetch(&request).await?;

        let mut state = self.lock();
        if push_history {
            if let Some(previous) = state.url.take() {
                state.history.push(previous);
            }
        }
        state.url = Some(fetched.url);
        state.html = fetched.body;
        state.form_values.clear();
        state.dismissed.clear();
        state.last_filled = None;
        Ok(())
    }

    fn resolve_url(&self, raw: &str) -> Result<Url, BrowserError> {
        let state = self.lock();
        let parsed = match &state.url {
            Some(base) => base.join(raw),
            None => Url::parse(raw),
        };
        parsed.map_err(|e| BrowserError::Navigation {
            url: raw.to_string(),
            reason: e.to_string(),
        })
    }

    fn plan_click(&self, locator: &Locator) -> Result<ClickAction, BrowserError> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        let element = locate(&doc, locator)?
            .ok_or_else(|| BrowserError::ElementNotFound(locator.to_string()))?;

        if !element_visible(element, &state.dismissed) {
            return Err(BrowserError::NotInteractable(locator.to_string()));
        }

        if let Some(href) = link_target(element) {
            if let Some(base) = &state.url {
                if let Ok(target) = base.join(&href) {
                    return Ok(ClickAction::Navigate(target));
                }
            }
        }

        if let Some(root) = overlay_root(element) {
            return Ok(ClickAction::Dismiss(node_path(root)));
        }

        if is_submit_control(element) {
            if let (Some(form), Some(base)) = (closest(element, "form"), &state.url) {
                let request = form_request(form, &state.form_values, base, self.timeout)?;
                return Ok(ClickAction::Submit(request));
            }
        }

        Ok(ClickAction::Nothing)
    }

    fn plan_enter(&self) -> Result<Option<FetchRequest>, BrowserError> {
        let state = self.lock();
        let (Some(path), Some(base)) = (&state.last_filled, &state.url) else {
            return Ok(None);
        };
        let doc = Html::parse_document(&state.html);
        let Some(form) = element_at(&doc, path).and_then(|input| closest(input, "form")) else {
            return Ok(None);
        };
        form_request(form, &state.form_values, base, self.timeout).map(Some)
    }

    fn visible_overlays(&self) -> Vec<NodePath> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        let mut roots: Vec<NodePath> = Vec::new();
        for candidate in doc.select(&OVERLAY) {
            let Some(root) = overlay_root(candidate) else {
                continue;
            };
            let path = node_path(root);
            if !roots.contains(&path) && element_visible(root, &state.dismissed) {
                roots.push(path);
            }
        }
        roots
    }

    fn with_element<T>(
        &self,
        locator: &Locator,
        f: impl FnOnce(ElementRef<'_>, &PageState) -> T,
    ) -> Result<T, BrowserError> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        let element = locate(&doc, locator)?
            .ok_or_else(|| BrowserError::ElementNotFound(locator.to_string()))?;
        Ok(f(element, &state))
    }
}

#[async_trait]
impl PageDriver for HttpPage {
    async fn goto(&self, url: &str, options: &NavigateOptions) -> Result<(), BrowserError> {
        let target = self.resolve_url(url)?;
        debug!("Navigating to {} (wait until {:?})", target, options.wait_until);
        self.navigate(FetchRequest::get(target, options.timeout), true)
            .await
    }

    async fn go_back(&self) -> Result<(), BrowserError> {
        let previous = self.lock().history.pop();
        match previous {
            Some(url) => {
                self.navigate(FetchRequest::get(url, self.timeout), false)
                    .await
            }
            None => Err(BrowserError::Navigation {
                url: self.current_url(),
                reason: "no history entry to go back to".to_string(),
            }),
        }
    }

    fn current_url(&self) -> String {
        self.lock()
            .url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "about:blank".to_string())
    }

    async fn count(&self, scope: Option<&Locator>, selector: &str) -> Result<usize, BrowserError> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        let parsed = parse_selector(selector)?;
        match scope {
            Some(scope) => Ok(locate(&doc, scope)?
                .map(|el| el.select(&parsed).count())
                .unwrap_or(0)),
            None => Ok(doc.select(&parsed).count()),
        }
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        Ok(locate(&doc, locator)?
            .map(|el| element_visible(el, &state.dismissed))
            .unwrap_or(false))
    }

    async fn text(&self, locator: &Locator) -> Result<String, BrowserError> {
        self.with_element(locator, |el, state| {
            if matches!(el.value().name(), "input" | "textarea") {
                if let Some(value) = state.form_values.get(&node_path(el)) {
                    return value.clone();
                }
                if let Some(value) = el.value().attr("value") {
                    return value.to_string();
                }
            }
            element_text(el)
        })
    }

    async fn attribute(
        &self,
        locator: &Locator,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.with_element(locator, |el, _| el.value().attr(name).map(str::to_string))
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        match self.plan_click(locator)? {
            ClickAction::Navigate(url) => {
                debug!("Click on {} follows link to {}", locator, url);
                self.navigate(FetchRequest::get(url, self.timeout), true)
                    .await
            }
            ClickAction::Submit(request) => {
                debug!("Click on {} submits form to {}", locator, request.url);
                self.navigate(request, true).await
            }
            ClickAction::Dismiss(path) => {
                debug!("Click on {} closes its overlay", locator);
                self.lock().dismissed.insert(path);
                Ok(())
            }
            ClickAction::Nothing => {
                debug!("Click on {} had no document-level effect", locator);
                Ok(())
            }
        }
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        let path = self.with_element(locator, |el, _| {
            let fillable = match el.value().name() {
                "textarea" => true,
                "input" => !matches!(
                    el.value().attr("type").map(|t| t.to_ascii_lowercase()).as_deref(),
                    Some("hidden" | "submit" | "button" | "image" | "reset" | "checkbox" | "radio")
                ),
                _ => false,
            };
            fillable.then(|| node_path(el))
        })?;

        let path = path.ok_or_else(|| BrowserError::NotInteractable(locator.to_string()))?;
        let mut state = self.lock();
        state.form_values.insert(path.clone(), value.to_string());
        state.last_filled = Some(path);
        Ok(())
    }

    async fn press(&self, key: Key) -> Result<(), BrowserError> {
        match key {
            Key::Enter => match self.plan_enter()? {
                Some(request) => self.navigate(request, true).await,
                None => Ok(()),
            },
            Key::Escape => {
                if let Some(top) = self.visible_overlays().pop() {
                    self.lock().dismissed.insert(top);
                }
                Ok(())
            }
        }
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>, BrowserError> {
        // No layout engine: existence is all that can be reported.
        self.with_element(locator, |_, _| None)
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        let overlays = self.visible_overlays();
        debug!("Click at ({}, {}) closes {} overlay(s)", x, y, overlays.len());
        self.lock().dismissed.extend(overlays);
        Ok(())
    }

    async fn wait_for_load(&self, _timeout: Duration) -> Result<(), BrowserError> {
        // Documents are complete once fetched.
        Ok(())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        let state = self.lock();
        let doc = Html::parse_document(&state.html);
        Ok(doc
            .select(&TITLE)
            .next()
            .map(element_text)
            .unwrap_or_default())
    }
}

// ===== Document helpers =====

fn parse_selector(selector: &str) -> Result<Selector, BrowserError> {
    Selector::parse(selector)
        .map_err(|e| BrowserError::InvalidSelector(format!("{}: {:?}", selector, e)))
}

fn locate<'a>(doc: &'a Html, locator: &Locator) -> Result<Option<ElementRef<'a>>, BrowserError> {
    let selector = parse_selector(&locator.selector)?;
    match &locator.parent {
        Some(parent) => Ok(locate(doc, parent)?
            .and_then(|scope| scope.select(&selector).nth(locator.nth))),
        None => Ok(doc.select(&selector).nth(locator.nth)),
    }
}

fn node_path(element: ElementRef<'_>) -> NodePath {
    let mut path = Vec::new();
    let mut node = *element;
    loop {
        path.push(node.prev_siblings().count());
        match node.parent() {
            Some(parent) => node = parent,
            None => break,
        }
    }
    path.reverse();
    path
}

fn element_at<'a>(doc: &'a Html, path: &[usize]) -> Option<ElementRef<'a>> {
    let mut node = doc.tree.root();
    for &index in path.iter().skip(1) {
        node = node.children().nth(index)?;
    }
    ElementRef::wrap(node)
}

fn self_and_ancestors(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    std::iter::once(element).chain(element.ancestors().filter_map(ElementRef::wrap))
}

fn closest<'a>(element: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    self_and_ancestors(element).find(|el| el.value().name() == tag)
}

fn hidden_by_markup(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    if NON_RENDERED.contains(&value.name()) || value.attr("hidden").is_some() {
        return true;
    }
    if value.attr("aria-hidden") == Some("true") {
        return true;
    }
    if value.name() == "input"
        && value
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
    {
        return true;
    }
    value.attr("style").is_some_and(|style| {
        let style = style.to_ascii_lowercase().replace(' ', "");
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn element_visible(element: ElementRef<'_>, dismissed: &HashSet<NodePath>) -> bool {
    for node in self_and_ancestors(element) {
        if hidden_by_markup(&node) {
            return false;
        }
        if !dismissed.is_empty() && dismissed.contains(&node_path(node)) {
            return false;
        }
    }

    // Empty non-replaced elements render with zero size.
    if REPLACED.contains(&element.value().name()) {
        return true;
    }
    let has_text = element.text().any(|t| !t.trim().is_empty());
    let has_replaced_child = element
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|d| REPLACED.contains(&d.value().name()));
    has_text || has_replaced_child
}

fn element_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skipped = node
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|p| NON_RENDERED.contains(&p.value().name()));
        let trimmed = text.trim();
        if !skipped && !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    parts.join("\n")
}

fn link_target(element: ElementRef<'_>) -> Option<String> {
    let anchor = closest(element, "a")?;
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    Some(href.to_string())
}

/// Outermost overlay container holding `element`, never `<html>` or `<body>`
fn overlay_root(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    self_and_ancestors(element)
        .filter(|el| !matches!(el.value().name(), "html" | "body"))
        .filter(|el| OVERLAY.matches(el))
        .last()
}

fn is_submit_control(element: ElementRef<'_>) -> bool {
    self_and_ancestors(element).any(|el| {
        let value = el.value();
        let kind = value.attr("type").map(|t| t.to_ascii_lowercase());
        match value.name() {
            "button" => !matches!(kind.as_deref(), Some("button" | "reset")),
            "input" => matches!(kind.as_deref(), Some("submit" | "image")),
            _ => false,
        }
    })
}

fn form_request(
    form: ElementRef<'_>,
    values: &HashMap<NodePath, String>,
    base: &Url,
    timeout: Duration,
) -> Result<FetchRequest, BrowserError> {
    let action = form.value().attr("action").unwrap_or("");
    let mut url = base.join(action).map_err(|e| BrowserError::Navigation {
        url: action.to_string(),
        reason: e.to_string(),
    })?;
    url.set_fragment(None);

    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => Method::Post,
        _ => Method::Get,
    };

    let mut fields = Vec::new();
    for field in form.descendants().filter_map(ElementRef::wrap) {
        let value = field.value();
        let Some(name) = value.attr("name") else {
            continue;
        };
        if value.attr("disabled").is_some() {
            continue;
        }
        let field_value = match value.name() {
            "input" => {
                let kind = value.attr("type").map(|t| t.to_ascii_lowercase());
                match kind.as_deref() {
                    Some("submit" | "button" | "image" | "reset" | "file") => continue,
                    Some("checkbox" | "radio") if value.attr("checked").is_none() => continue,
                    Some("checkbox" | "radio") => value.attr("value").unwrap_or("on").to_string(),
                    _ => values
                        .get(&node_path(field))
                        .cloned()
                        .or_else(|| value.attr("value").map(str::to_string))
                        .unwrap_or_default(),
                }
            }
            "textarea" => values
                .get(&node_path(field))
                .cloned()
                .unwrap_or_else(|| field.text().collect::<String>()),
            "select" => selected_option(field),
            _ => continue,
        };
        fields.push((name.to_string(), field_value));
    }

    match method {
        Method::Get => {
            url.query_pairs_mut().clear().extend_pairs(fields.iter());
            Ok(FetchRequest::get(url, timeout))
        }
        Method::Post => Ok(FetchRequest {
            url,
            method,
            form: fields,
            timeout,
        }),
    }
}

fn selected_option(select: ElementRef<'_>) -> String {
    let options: Vec<_> = select
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "option")
        .collect();
    options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| options.first())
        .map(|o| {
            o.value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| o.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StaticFetcher;

    const SEARCH: &str = r#"
        <html><head><title>Find jobs | Jobs Test</title></head><body class="cookie-open">
          <div id="cookie-banner"><p>We use cookies</p><button class="accept">Accept</button></div>
          <form action="/search" method="get">
            <input name="q" type="text">
            <input name="where" type="text" value="">
            <input name="token" type="hidden" value="abc">
            <button type="submit">Search</button>
          </form>
          <a class="seo" href="/hidden"></a>
          <p style="display: none">ghost</p>
        </body></html>
    "#;

    fn page_with(fetcher: StaticFetcher) -> HttpPage {
        HttpPage::new(Arc::new(fetcher))
    }

    #[tokio::test]
    async fn test_visibility_heuristics() {
        let page = page_with(StaticFetcher::new().with_page("https://jobs.test/", SEARCH));
        page.goto("https://jobs.test/", &NavigateOptions::default())
            .await
            .unwrap();

        assert!(page.is_visible(&Locator::new("button.accept")).await.unwrap());
        assert!(!page.is_visible(&Locator::new("a.seo")).await.unwrap());
        assert!(page.is_visible(&Locator::nth("p", 0)).await.unwrap());
        assert!(!page.is_visible(&Locator::nth("p", 1)).await.unwrap());
        assert!(!page
            .is_visible(&Locator::new("input[name='token']"))
            .await
            .unwrap());
        assert!(!page.is_visible(&Locator::new("#missing")).await.unwrap());
    }

    #[tokio::test]
    async fn test_click_inside_overlay_dismisses_it() {
        let page = page_with(StaticFetcher::new().with_page("https://jobs.test/", SEARCH));
        page.goto("https://jobs.test/", &NavigateOptions::default())
            .await
            .unwrap();

        page.click(&Locator::new("button.accept")).await.unwrap();
        assert!(!page.is_visible(&Locator::new("#cookie-banner")).await.unwrap());
        // the form outside the banner is untouched
        assert!(page.is_visible(&Locator::new("form")).await.unwrap());
    }

    #[tokio::test]
    async fn test_fill_and_submit_builds_query() {
        let fetcher = StaticFetcher::new()
            .with_page("https://jobs.test/", SEARCH)
            .with_page(
                "https://jobs.test/search?q=rust&where=Berlin&token=abc",
                "<html><body><h1>Results</h1></body></html>",
            );
        let page = page_with(fetcher);
        page.goto("https://jobs.test/", &NavigateOptions::default())
            .await
            .unwrap();

        page.fill(&Locator::new("input[name='q']"), "rust")
            .await
            .unwrap();
        page.fill(&Locator::new("input[name='where']"), "Berlin")
            .await
            .unwrap();
        page.click(&Locator::new("button[type='submit']"))
            .await
            .unwrap();

        assert_eq!(
            page.current_url(),
            "https://jobs.test/search?q=rust&where=Berlin&token=abc"
        );
        assert_eq!(page.text(&Locator::new("h1")).await.unwrap(), "Results");

        page.go_back().await.unwrap();
        assert_eq!(page.current_url(), "https://jobs.test/");
    }

    #[tokio::test]
    async fn test_escape_closes_topmost_dialog() {
        let html = r#"<body>
            <div role="dialog" class="promo"><p>Sign up!</p></div>
            <main><p>content</p></main>
        </body>"#;
        let page = page_with(StaticFetcher::new().with_page("https://jobs.test/", html));
        page.goto("https://jobs.test/", &NavigateOptions::default())
            .await
            .unwrap();

        assert!(page.is_visible(&Locator::new(".promo")).await.unwrap());
        page.press(Key::Escape).await.unwrap();
        assert!(!page.is_visible(&Locator::new(".promo")).await.unwrap());
        assert!(page.is_visible(&Locator::new("main")).await.unwrap());
    }

    #[tokio::test]
    async fn test_scoped_locators_and_title() {
        let html = r#"<html><head><title>Results</title></head><body><ul>
            <li class="card"><h3>First</h3></li>
            <li class="card"><h3>Second</h3><span class="co">Acme</span></li>
        </ul></body></html>"#;
        let page = page_with(StaticFetcher::new().with_page("https://jobs.test/", html));
        page.goto("https://jobs.test/", &NavigateOptions::default())
            .await
            .unwrap();

        let second = Locator::nth("li.card", 1);
        let title = Locator::new("h3").within(&second);
        assert_eq!(page.text(&title).await.unwrap(), "Second");
        assert_eq!(page.count(Some(&second), ".co").await.unwrap(), 1);
        assert_eq!(page.count(None, "li.card").await.unwrap(), 2);
        assert_eq!(page.title().await.unwrap(), "Results");
        assert!(matches!(
            page.count(None, "li[").await,
            Err(BrowserError::InvalidSelector(_))
        ));
    }
}
