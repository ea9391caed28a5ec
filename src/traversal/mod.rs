// src/traversal/mod.rs
//! Paginated listing traversal over per-site selector profiles

pub mod controller;
pub mod external;
pub mod site;

pub use controller::{
    CardFailure, ListingTraversal, PageSink, SearchParams, TraversalContext, TraversalLimits,
    TraversalOutcome, TraversalState,
};
pub use site::SiteProfile;
