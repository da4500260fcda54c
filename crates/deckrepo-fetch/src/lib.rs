//! deckrepo-fetch - content acquisition and installation engine.
//!
//! Retrieves the community video catalog (network first, cache fallback),
//! orchestrates concurrent per-item downloads with redirect following and
//! progress reporting, and commits completed downloads into the playback
//! override directory under the boot/suspend install policies.

pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod install;
pub mod types;

#[cfg(test)]
mod testserver;

pub use api::RepoApi;
pub use config::{Config, ConfigFile};
pub use downloader::{Orchestrator, ProgressSink, SessionState};
pub use error::FetchError;
pub use install::{Installer, SUSPEND_FILENAME};
pub use types::{
    CatalogItem, CatalogSnapshot, InstallClass, InstallReport, InstalledEntry, SnapshotSource,
    VideoKind,
};
