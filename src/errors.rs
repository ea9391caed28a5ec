// src/errors.rs
//! Typed failures for the extraction pipeline

use std::time::Duration;
use thiserror::Error;

/// Failures raised by a page driver while navigating or interacting
#[derive(Debug, Error, Clone)]
pub enum BrowserError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {after:?} while {what}")]
    Timeout { what: String, after: Duration },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),
}

impl BrowserError {
    /// Transient faults are recovered locally and never outlive the current card
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::Navigation { .. }
                | BrowserError::Timeout { .. }
                | BrowserError::ElementNotFound(_)
                | BrowserError::NotInteractable(_)
        )
    }
}

/// Structural faults: the origin site changed beyond the fallback chains
#[derive(Debug, Error, Clone)]
pub enum TraversalError {
    #[error("No card container resolved on {url}")]
    NoCards { url: String },

    #[error("First card on page {page} failed: {reason}")]
    FirstCardFailed { page: usize, reason: String },

    #[error("Search form unavailable: {0}")]
    SearchFormUnavailable(String),

    #[error("Too many card failures ({0})")]
    TooManyCardFailures(usize),
}

/// Partial-extraction faults for a single record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("job title is missing")]
    MissingTitle,

    #[error("company name is missing")]
    MissingCompany,
}
