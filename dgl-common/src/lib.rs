//! # DGL Common Library
//!
//! Shared code for the DAP gold-label tools:
//! - Document store abstraction with in-memory and SQLite backends
//! - Manifest, label and export models
//! - Checklist item catalog
//! - Label and manifest normalization
//! - Configuration loading
//! - Service credential and admin authorization checks

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod normalize;
pub mod repo;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use models::{ExportRow, Identity, ItemValues, Label, Manifest, ManifestImage, Split, UpdatedBy, ViewType};
