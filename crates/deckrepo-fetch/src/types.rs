use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which of the two destination policies governs an asset.
///
/// On the wire the catalog uses `"boot_video"` for boot videos; every other
/// value is treated as a suspend video, matching the upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoKind {
    BootVideo,
    SuspendVideo,
}

impl From<String> for VideoKind {
    fn from(s: String) -> Self {
        if s == "boot_video" {
            VideoKind::BootVideo
        } else {
            VideoKind::SuspendVideo
        }
    }
}

impl From<VideoKind> for String {
    fn from(kind: VideoKind) -> Self {
        match kind {
            VideoKind::BootVideo => "boot_video".to_owned(),
            VideoKind::SuspendVideo => "suspend_video".to_owned(),
        }
    }
}

/// The submitting user as embedded in a catalog post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub steam_name: String,
}

/// One remote video descriptor from the catalog.
///
/// Field names follow this crate's vocabulary; serde renames map them onto
/// the wire format of the `posts` document, so serializing an item back out
/// (e.g. into a metadata sidecar) reproduces the catalog shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: VideoKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Direct stream URL of the video, when the catalog exposes one.
    #[serde(rename = "video", default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(rename = "thumbnail", default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "downloads", default)]
    pub download_count: u64,
    #[serde(rename = "likes", default)]
    pub like_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
}

impl CatalogItem {
    /// Display name of the submitting user.
    pub fn author(&self) -> &str {
        match &self.user {
            Some(user) if !user.steam_name.is_empty() => &user.steam_name,
            _ => "Unknown",
        }
    }
}

/// The full catalog response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub posts: Vec<CatalogItem>,
}

/// Where a [`CatalogSnapshot`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Network,
    Cache,
}

/// An atomically-refreshed view of the catalog.
///
/// A snapshot is either entirely from one network response or entirely from
/// the cache file; the two are never merged.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub items: Vec<CatalogItem>,
    pub source: SnapshotSource,
}

impl CatalogSnapshot {
    pub fn new(items: Vec<CatalogItem>, source: SnapshotSource) -> Self {
        Self { items, source }
    }

    pub fn empty(source: SnapshotSource) -> Self {
        Self {
            items: Vec::new(),
            source,
        }
    }
}

/// Terminal outcome of one install, delivered to the progress sink.
///
/// The installer never raises to its caller; every I/O failure is converted
/// into a report with `success == false` and a descriptive message.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub success: bool,
    pub message: String,
}

impl InstallReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Destination policy of an installed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallClass {
    Boot,
    Suspend,
}

/// One installed video, derived by scanning the install root.
#[derive(Debug, Clone)]
pub struct InstalledEntry {
    pub filename: String,
    pub install_class: InstallClass,
    pub size_bytes: u64,
    /// Sidecar descriptor, when present and parseable.
    pub metadata: Option<CatalogItem>,
    /// Local thumbnail inside the metadata directory, when present.
    pub thumbnail: Option<PathBuf>,
}
