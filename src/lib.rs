// src/lib.rs
//! Job harvesting and ranking: traverse job boards, normalize postings,
//! store them without duplicates, and rank them against a skill profile.

pub mod browser;
pub mod cli;
pub mod config;
pub mod core;
pub mod errors;
pub mod harvest;
pub mod interstitial;
pub mod models;
pub mod normalize;
pub mod resolver;
pub mod scoring;
pub mod store;
pub mod traversal;
pub mod utils;

pub use config::ConfigManager;
pub use harvest::{Harvester, RunReport};
