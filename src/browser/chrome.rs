// src/browser/chrome.rs
//! Chromium page driver over the DevTools protocol.
//!
//! Element access runs as small scripts that resolve a `Locator` chain in the
//! page and reply with a JSON status object; pointer and keyboard input go
//! through `Input.dispatch*Event` so the page sees trusted events.

use super::{BoundingBox, Key, Locator, NavigateOptions, PageDriver, WaitUntil};
use crate::errors::BrowserError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::{
    GetNavigationHistoryParams, NavigateToHistoryEntryParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_WINDOW: Duration = Duration::from_millis(500);
/// Grace period for a click or key press to start a navigation
const SETTLE_DELAY: Duration = Duration::from_millis(300);

const LAUNCH_ARGS: [&str; 10] = [
    "--disable-background-networking",
    "--disable-breakpad",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-dev-shm-usage",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-sync",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Launch settings for the local Chromium
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Auto-detected when unset
    pub executable: Option<PathBuf>,
    /// Persistent profile; a throwaway one is used when unset
    pub user_data_dir: Option<PathBuf>,
    pub no_sandbox: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            user_data_dir: None,
            no_sandbox: false,
        }
    }
}

impl BrowserSettings {
    fn browser_config(&self, request_timeout: Duration) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(request_timeout)
            .launch_timeout(LAUNCH_TIMEOUT)
            .args(LAUNCH_ARGS);
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &self.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        builder
            .build()
            .map_err(|e| anyhow!("Invalid browser configuration: {}", e))
    }
}

pub struct ChromePage {
    browser: tokio::sync::Mutex<Browser>,
    events: JoinHandle<()>,
    page: Page,
    url: Mutex<String>,
    timeout: Duration,
}

impl ChromePage {
    /// Starts Chromium with one blank tab. `timeout` bounds every protocol
    /// request and the navigations started by clicks or key presses.
    pub async fn launch(settings: &BrowserSettings, timeout: Duration) -> Result<Self> {
        let config = settings.browser_config(timeout)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch Chromium")?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("DevTools connection event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;
        info!("Chromium ready (headless: {})", settings.headless);

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            events,
            page,
            url: Mutex::new("about:blank".to_string()),
            timeout,
        })
    }

    /// Installs the session `Cookie` header for `origin` before the first navigation
    pub async fn set_cookies(&self, header: &str, origin: &str) -> Result<()> {
        let mut cookies = Vec::new();
        for (name, value) in cookie_pairs(header) {
            let cookie = CookieParam::builder()
                .name(name)
                .value(value)
                .url(origin)
                .build()
                .map_err(|e| anyhow!("Invalid session cookie: {}", e))?;
            cookies.push(cookie);
        }
        let installed = cookies.len();
        self.page
            .set_cookies(cookies)
            .await
            .context("Failed to install session cookies")?;
        info!("Installed {} session cookie(s) for {}", installed, origin);
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        let mut browser = self.browser.into_inner();
        browser.close().await.context("Failed to close Chromium")?;
        if let Err(e) = browser.wait().await {
            warn!("Chromium did not exit cleanly: {}", e);
        }
        self.events.abort();
        Ok(())
    }

    fn lock_url(&self) -> MutexGuard<'_, String> {
        self.url.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn refresh_url(&self) {
        match self.page.url().await {
            Ok(Some(url)) => *self.lock_url() = url,
            Ok(None) => {}
            Err(e) => debug!("Could not read page URL: {}", e),
        }
    }

    fn fault(&self, what: &str, reason: impl std::fmt::Display) -> BrowserError {
        BrowserError::Navigation {
            url: self.current_url(),
            reason: format!("{}: {}", what, reason),
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str, what: &str) -> Result<T, BrowserError> {
        let mut params = EvaluateParams::new(script);
        params.return_by_value = Some(true);
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| self.fault(what, e))?;
        let raw: String = result.into_value().map_err(|e| self.fault(what, e))?;
        serde_json::from_str(&raw).map_err(|e| self.fault(what, e))
    }

    async fn on_element<T: DeserializeOwned>(
        &self,
        locator: &Locator,
        body: &str,
    ) -> Result<T, BrowserError> {
        let script = element_script(&locator_chain(Some(locator)), body);
        let reply: Reply<T> = self.eval(&script, "element script").await?;
        reply.into_result(locator)
    }

    async fn dispatch_click(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        for kind in [
            DispatchMouseEventType::MouseMoved,
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let pressing = !matches!(kind, DispatchMouseEventType::MouseMoved);
            let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
            if pressing {
                builder = builder.button(MouseButton::Left).click_count(1);
            }
            let params = builder.build().map_err(|e| self.fault("mouse event", e))?;
            self.page
                .execute(params)
                .await
                .map_err(|e| self.fault("mouse event", e))?;
        }
        Ok(())
    }

    /// Lets a navigation started by input begin, then waits for it to load
    async fn settle(&self) -> Result<(), BrowserError> {
        sleep(SETTLE_DELAY).await;
        let loaded = self.wait_for_load(self.timeout).await;
        self.refresh_url().await;
        loaded
    }

    async fn document_ready(&self) -> bool {
        self.eval::<String>("JSON.stringify(document.readyState)", "ready state")
            .await
            .map(|state| state == "complete")
            .unwrap_or(false)
    }

    /// Resource count unchanged across one idle window
    async fn wait_for_network_idle(&self, limit: Duration) -> Result<(), BrowserError> {
        const RESOURCES: &str = "JSON.stringify(performance.getEntriesByType('resource').length)";
        let deadline = Instant::now() + limit;
        let mut last: Option<usize> = None;
        while Instant::now() < deadline {
            let seen = self.eval::<usize>(RESOURCES, "resource count").await.ok();
            if seen.is_some() && seen == last && self.document_ready().await {
                return Ok(());
            }
            last = seen;
            sleep(IDLE_WINDOW).await;
        }
        Err(BrowserError::Timeout {
            what: format!("waiting for network idle on {}", self.current_url()),
            after: limit,
        })
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str, options: &NavigateOptions) -> Result<(), BrowserError> {
        let started = Instant::now();
        debug!("Navigating to {} (wait until {:?})", url, options.wait_until);
        match timeout(options.timeout, self.page.goto(url)).await {
            Err(_) => {
                return Err(BrowserError::Timeout {
                    what: format!("loading {}", url),
                    after: options.timeout,
                })
            }
            Ok(Err(e)) => {
                return Err(BrowserError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(_)) => {}
        }
        self.refresh_url().await;

        if options.wait_until == WaitUntil::NetworkIdle {
            let remaining = options.timeout.saturating_sub(started.elapsed());
            // the document is loaded at this point; idle is best effort
            if let Err(e) = self.wait_for_network_idle(remaining).await {
                debug!("{}", e);
            }
        }
        Ok(())
    }

    async fn go_back(&self) -> Result<(), BrowserError> {
        let history = self
            .page
            .execute(GetNavigationHistoryParams::default())
            .await
            .map_err(|e| self.fault("navigation history", e))?;
        let previous = usize::try_from(history.result.current_index)
            .ok()
            .filter(|index| *index > 0)
            .and_then(|index| history.result.entries.get(index - 1))
            .ok_or_else(|| self.fault("go back", "no history entry to go back to"))?;

        debug!("Going back to {}", previous.url);
        self.page
            .execute(NavigateToHistoryEntryParams::new(previous.id))
            .await
            .map_err(|e| self.fault("go back", e))?;
        self.settle().await
    }

    fn current_url(&self) -> String {
        self.lock_url().clone()
    }

    async fn count(&self, scope: Option<&Locator>, selector: &str) -> Result<usize, BrowserError> {
        let body = format!(
            "return ok(el.querySelectorAll({}).length);",
            js_string(selector)
        );
        let script = element_script(&locator_chain(scope), &body);
        let reply: Reply<usize> = self.eval(&script, "count").await?;
        match reply {
            Reply::NotFound => Ok(0),
            Reply::InvalidSelector { detail } => Err(BrowserError::InvalidSelector(format!(
                "{}: {}",
                selector, detail
            ))),
            other => other.into_result(&Locator::new(selector)),
        }
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError> {
        match self.on_element(locator, VISIBLE_BODY).await {
            Err(BrowserError::ElementNotFound(_)) => Ok(false),
            other => other,
        }
    }

    async fn text(&self, locator: &Locator) -> Result<String, BrowserError> {
        self.on_element(locator, TEXT_BODY).await
    }

    async fn attribute(
        &self,
        locator: &Locator,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let body = format!("return ok(el.getAttribute({}));", js_string(name));
        self.on_element(locator, &body).await
    }

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError> {
        let point: Point = self.on_element(locator, CLICK_POINT_BODY).await?;
        debug!("Clicking {} at ({:.0}, {:.0})", locator, point.x, point.y);
        self.dispatch_click(point.x, point.y).await?;
        self.settle().await
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError> {
        let body = format!("{}\nsetValue(el, {});\nreturn ok(true);", FILL_GUARD, js_string(value));
        let _: bool = self.on_element(locator, &body).await?;
        Ok(())
    }

    async fn press(&self, key: Key) -> Result<(), BrowserError> {
        let (name, code) = key_codes(key);
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let mut builder = DispatchKeyEventParams::builder()
                .r#type(kind.clone())
                .key(name)
                .code(name)
                .windows_virtual_key_code(code)
                .native_virtual_key_code(code);
            if key == Key::Enter && matches!(kind, DispatchKeyEventType::KeyDown) {
                builder = builder.text("\r");
            }
            let params = builder.build().map_err(|e| self.fault("key event", e))?;
            self.page
                .execute(params)
                .await
                .map_err(|e| self.fault("key event", e))?;
        }
        self.settle().await
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>, BrowserError> {
        let rect: Option<Rect> = self.on_element(locator, BOX_BODY).await?;
        Ok(rect.map(Rect::into_box))
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), BrowserError> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(BrowserError::NotInteractable(format!("point ({}, {})", x, y)));
        }
        self.dispatch_click(x, y).await?;
        self.settle().await
    }

    async fn wait_for_load(&self, limit: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + limit;
        loop {
            if self.document_ready().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("waiting for {} to load", self.current_url()),
                    after: limit,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn title(&self) -> Result<String, BrowserError> {
        self.eval("JSON.stringify(document.title)", "title").await
    }
}

// ===== In-page scripts =====

const VISIBLE_BODY: &str = r#"
const style = getComputedStyle(el);
const rect = el.getBoundingClientRect();
return ok(rect.width > 0 && rect.height > 0
    && style.visibility !== 'hidden' && style.display !== 'none'
    && Number(style.opacity) !== 0);"#;

const TEXT_BODY: &str = r#"
if (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement) return ok(el.value);
return ok((el.innerText ?? el.textContent ?? '').trim());"#;

const BOX_BODY: &str = r#"
el.scrollIntoView({ block: 'center', inline: 'center' });
const r = el.getBoundingClientRect();
if (r.width === 0 || r.height === 0) return ok(null);
return ok({ x: r.left, y: r.top, width: r.width, height: r.height });"#;

const CLICK_POINT_BODY: &str = r#"
el.scrollIntoView({ block: 'center', inline: 'center' });
const r = el.getBoundingClientRect();
if (r.width === 0 || r.height === 0) return fail('not_interactable', 'zero-size box');
const x = r.left + r.width / 2;
const y = r.top + r.height / 2;
const hit = document.elementFromPoint(x, y);
if (!hit || !(hit === el || el.contains(hit) || hit.contains(el))) {
    return fail('not_interactable', 'covered by ' + (hit ? hit.tagName.toLowerCase() : 'nothing'));
}
return ok({ x, y });"#;

const FILL_GUARD: &str = r#"
if (!(el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement) || el.disabled || el.readOnly) {
    return fail('not_interactable', 'not a text field');
}
const setValue = (field, value) => {
    field.focus();
    const proto = field instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(field, value);
    field.dispatchEvent(new Event('input', { bubbles: true }));
    field.dispatchEvent(new Event('change', { bubbles: true }));
};"#;

/// Outermost-first `(selector, nth)` pairs leading to `locator`
fn locator_chain(locator: Option<&Locator>) -> Vec<(String, usize)> {
    let mut chain = Vec::new();
    let mut next = locator;
    while let Some(current) = next {
        chain.push((current.selector.clone(), current.nth));
        next = current.parent.as_deref();
    }
    chain.reverse();
    chain
}

/// Wraps `body` so it runs with `el` bound to the resolved element (the
/// document for an empty chain) and always yields a JSON string.
fn element_script(chain: &[(String, usize)], body: &str) -> String {
    let chain = serde_json::to_string(chain).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
const ok = (value) => JSON.stringify({{ status: 'ok', value }});
const fail = (status, detail) => JSON.stringify({{ status, detail: String(detail) }});
let el = document;
for (const [selector, nth] of {chain}) {{
    let matches;
    try {{ matches = el.querySelectorAll(selector); }}
    catch (e) {{ return fail('invalid_selector', e.message); }}
    el = matches[nth];
    if (!el) return fail('not_found', selector);
}}
{body}
}})()"#
    )
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn key_codes(key: Key) -> (&'static str, i64) {
    match key {
        Key::Escape => ("Escape", 27),
        Key::Enter => ("Enter", 13),
    }
}

/// Splits a raw `Cookie` header into name/value pairs
fn cookie_pairs(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Reply<T> {
    Ok { value: T },
    NotFound,
    InvalidSelector { detail: String },
    NotInteractable { detail: String },
}

impl<T> Reply<T> {
    fn into_result(self, locator: &Locator) -> Result<T, BrowserError> {
        match self {
            Reply::Ok { value } => Ok(value),
            Reply::NotFound => Err(BrowserError::ElementNotFound(locator.to_string())),
            Reply::InvalidSelector { detail } => Err(BrowserError::InvalidSelector(format!(
                "{}: {}",
                locator, detail
            ))),
            Reply::NotInteractable { detail } => Err(BrowserError::NotInteractable(format!(
                "{} ({})",
                locator, detail
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Rect {
    fn into_box(self) -> BoundingBox {
        BoundingBox {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_chain_is_outermost_first() {
        let card = Locator::nth("li.job-card", 2);
        let title = Locator::new("h3 a").within(&card);
        assert_eq!(
            locator_chain(Some(&title)),
            vec![("li.job-card".to_string(), 2), ("h3 a".to_string(), 0)]
        );
        assert!(locator_chain(None).is_empty());
    }

    #[test]
    fn test_element_script_embeds_chain_as_json() {
        let chain = locator_chain(Some(&Locator::new("a[href*='view']")));
        let script = element_script(&chain, TEXT_BODY);
        assert!(script.contains(r#"[["a[href*='view']",0]]"#));
        assert!(script.starts_with("(() => {"));
        assert!(script.trim_end().ends_with("})()"));
        assert_eq!(js_string("it's \"quoted\""), r#""it's \"quoted\"""#);
    }

    #[test]
    fn test_replies_map_to_browser_errors() {
        let locator = Locator::nth("li.card", 4);

        let ok: Reply<usize> = serde_json::from_str(r#"{"status":"ok","value":3}"#).unwrap();
        assert_eq!(ok.into_result(&locator).unwrap(), 3);

        let missing: Reply<String> = serde_json::from_str(r#"{"status":"not_found","detail":"li.card"}"#).unwrap();
        assert!(matches!(
            missing.into_result(&locator),
            Err(BrowserError::ElementNotFound(l)) if l == "li.card[4]"
        ));

        let covered: Reply<Point> = serde_json::from_str(
            r#"{"status":"not_interactable","detail":"covered by div"}"#,
        )
        .unwrap();
        assert!(matches!(
            covered.into_result(&locator),
            Err(BrowserError::NotInteractable(m)) if m.contains("covered by div")
        ));

        let attr: Reply<Option<String>> = serde_json::from_str(r#"{"status":"ok","value":null}"#).unwrap();
        assert_eq!(attr.into_result(&locator).unwrap(), None);
    }

    #[test]
    fn test_cookie_pairs() {
        assert_eq!(
            cookie_pairs(" li_at=AQE=x; JSESSIONID=\"ajax:1\" ;broken; =nameless"),
            vec![
                ("li_at".to_string(), "AQE=x".to_string()),
                ("JSESSIONID".to_string(), "\"ajax:1\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_settings_defaults() {
        let settings: BrowserSettings = serde_yaml::from_str("no_sandbox: true").unwrap();
        assert!(settings.headless);
        assert!(settings.no_sandbox);
        assert_eq!(settings.executable, None);
    }

    #[tokio::test]
    #[ignore = "needs a local Chromium"]
    async fn test_drives_a_real_page() {
        let html = "data:text/html,<title>Jobs</title>\
            <form><input name='q'><button type='button'>Go</button></form>\
            <ul><li class='card'><h3>First</h3></li><li class='card'><h3>Second</h3></li></ul>\
            <p style='display:none'>ghost</p>";
        let page = ChromePage::launch(&BrowserSettings::default(), Duration::from_secs(30))
            .await
            .unwrap();
        page.goto(html, &NavigateOptions::default()).await.unwrap();

        assert_eq!(page.title().await.unwrap(), "Jobs");
        assert_eq!(page.count(None, "li.card").await.unwrap(), 2);
        let second = Locator::new("h3").within(&Locator::nth("li.card", 1));
        assert_eq!(page.text(&second).await.unwrap(), "Second");
        assert!(!page.is_visible(&Locator::new("p")).await.unwrap());
        assert!(page.bounding_box(&second).await.unwrap().is_some());

        let field = Locator::new("input[name='q']");
        page.fill(&field, "rust").await.unwrap();
        assert_eq!(page.text(&field).await.unwrap(), "rust");
        page.click(&Locator::new("button")).await.unwrap();
        assert!(matches!(
            page.text(&Locator::new("#missing")).await,
            Err(BrowserError::ElementNotFound(_))
        ));

        page.close().await.unwrap();
    }
}
