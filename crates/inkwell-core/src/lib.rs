//! inkwell-core - page-level cloud sync for the Inkwell note editor
//!
//! This crate holds the provider adapters (OneDrive, BaiduPan), the account
//! and sync-state stores, the reconciliation engine, and the orchestrator
//! that runs it. Frontends (the CLI today) drive everything through
//! [`sync::SyncOrchestrator`] and [`services::AccountStore`].

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod local;
pub mod models;
pub mod network;
pub mod providers;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use models::{PageKey, PageSyncStatus, SyncResult};
