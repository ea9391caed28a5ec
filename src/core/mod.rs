// src/core/mod.rs
//! Infrastructure services shared by the CLI and the pipeline

pub mod database;

pub use database::Database;
