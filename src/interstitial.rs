// src/interstitial.rs
//! Consent banners and promotional modals that block interaction

use crate::browser::{Key, PageDriver};
use crate::resolver::SelectorResolver;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InterstitialSelectors {
    /// Accept/reject controls of consent dialogs
    pub consent: Vec<String>,
    /// Close controls of secondary modals
    pub close: Vec<String>,
    /// Containers that indicate a modal is still open
    pub modal: Vec<String>,
}

impl Default for InterstitialSelectors {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            consent: list(&[
                "button#onetrust-accept-btn-handler",
                "button#onetrust-reject-all-handler",
                "button[data-tracking-control-name*='accept']",
                "button[data-control-name='ga-cookie.consent.accept.v4']",
                "[class*='cookie'] button[class*='accept']",
                "[id*='cookie'] button[class*='accept']",
                "[class*='consent'] button[class*='accept']",
                "[class*='consent'] button[class*='reject']",
                "button[aria-label*='Accept']",
                "button[aria-label*='accept']",
            ]),
            close: list(&[
                "button.modal__dismiss",
                "button.artdeco-modal__dismiss",
                "button[aria-label='Dismiss']",
                "button[aria-label='Close']",
                "button[aria-label*='close']",
                "[role='dialog'] button[class*='close']",
                ".modal button[class*='close']",
                ".popover-x-button-close",
                "button.icl-CloseButton",
            ]),
            modal: list(&[
                "[role='dialog']",
                "[role='alertdialog']",
                "[aria-modal='true']",
                ".modal",
                "[class*='cookie']",
                "[class*='consent']",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DismissOutcome {
    NothingToDismiss,
    Consent(String),
    Closed(String),
    Escaped,
    ClickedOutside,
    StillBlocked,
}

impl DismissOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, DismissOutcome::StillBlocked)
    }
}

pub struct InterstitialHandler<'a> {
    page: &'a dyn PageDriver,
    selectors: &'a InterstitialSelectors,
}

impl<'a> InterstitialHandler<'a> {
    pub fn new(page: &'a dyn PageDriver, selectors: &'a InterstitialSelectors) -> Self {
        Self { page, selectors }
    }

    /// Tries each strategy in order and stops at the first that works.
    /// Never fails: a blocked page just makes later selectors miss.
    pub async fn dismiss(&self) -> DismissOutcome {
        let resolver = SelectorResolver::new(self.page);

        if let Some(control) = resolver.resolve(&self.selectors.consent).await.found() {
            match control.click().await {
                Ok(()) => {
                    info!("Dismissed consent dialog via {}", control.selector());
                    return DismissOutcome::Consent(control.selector().to_string());
                }
                Err(e) => debug!("Consent control {} not clickable: {}", control.selector(), e),
            }
        }

        if let Some(control) = resolver.resolve(&self.selectors.close).await.found() {
            match control.click().await {
                Ok(()) => {
                    info!("Closed modal via {}", control.selector());
                    return DismissOutcome::Closed(control.selector().to_string());
                }
                Err(e) => debug!("Close control {} not clickable: {}", control.selector(), e),
            }
        }

        if !self.modal_visible().await {
            return DismissOutcome::NothingToDismiss;
        }

        if let Err(e) = self.page.press(Key::Escape).await {
            debug!("Escape key failed: {}", e);
        }
        if !self.modal_visible().await {
            info!("Closed modal with Escape");
            return DismissOutcome::Escaped;
        }

        let (x, y) = self.outside_point().await;
        if let Err(e) = self.page.click_at(x, y).await {
            debug!("Click outside modal failed: {}", e);
        }
        if !self.modal_visible().await {
            info!("Closed modal by clicking outside at ({}, {})", x, y);
            return DismissOutcome::ClickedOutside;
        }

        debug!("Interstitial still blocking {}", self.page.current_url());
        DismissOutcome::StillBlocked
    }

    async fn modal_visible(&self) -> bool {
        SelectorResolver::new(self.page)
            .resolve(&self.selectors.modal)
            .await
            .is_found()
    }

    /// A neutral point left of (or above) the modal's box
    async fn outside_point(&self) -> (f64, f64) {
        let Some(modal) = SelectorResolver::new(self.page)
            .resolve(&self.selectors.modal)
            .await
            .found()
        else {
            return (5.0, 5.0);
        };
        match modal.bounding_box().await {
            Ok(Some(b)) if b.x > 10.0 => (b.x - 10.0, b.y.max(5.0)),
            Ok(Some(b)) if b.y > 10.0 => (b.x.max(5.0), b.y - 10.0),
            _ => (5.0, 5.0),
        }
    }
}
