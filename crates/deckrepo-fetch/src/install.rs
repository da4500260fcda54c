//! Placement of downloaded assets into the local install root, plus the
//! metadata sidecar store under its hidden subdirectory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::FetchError;
use crate::types::{CatalogItem, InstallClass, InstallReport, InstalledEntry, VideoKind};

/// Single-slot destination filename for suspend videos.
pub const SUSPEND_FILENAME: &str = "deck-suspend-animation.webm";

/// Sidecar key used for the suspend slot, regardless of the source slug.
pub const SUSPEND_META_KEY: &str = "suspend";

/// Hidden subdirectory holding metadata sidecars.
const META_DIR: &str = ".manager";

const VIDEO_EXT: &str = "webm";

/// Commits downloaded assets into the install root.
///
/// The installer exclusively owns the root's metadata subdirectory and takes
/// ownership of every temp file handed to [`Installer::install`], deleting
/// them on success and failure alike.
#[derive(Debug, Clone)]
pub struct Installer {
    root: PathBuf,
}

impl Installer {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().components().collect();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// Idempotently create the install root and its metadata subdirectory.
    ///
    /// Creation failure is logged but not raised; the subsequent copy will
    /// fail and surface its own error.
    pub fn ensure_directories(&self) {
        for dir in [self.root.clone(), self.meta_dir()] {
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(path = %dir.display(), error = %e, "failed to create install directory");
            }
        }
    }

    /// Commit a completed download, dispatching on the item's kind.
    ///
    /// The temp files belong to the installer from this point on and are
    /// removed on every path. Success is judged solely by the primary asset
    /// copy; sidecar trouble never fails the install.
    pub fn install(
        &self,
        item: &CatalogItem,
        video_tmp: &Path,
        thumb_tmp: Option<&Path>,
    ) -> InstallReport {
        let report = match item.kind {
            VideoKind::BootVideo => self.install_boot(video_tmp, &item.slug, Some(item), thumb_tmp),
            VideoKind::SuspendVideo => self.install_suspend(video_tmp, Some(item), thumb_tmp),
        };

        remove_if_present(video_tmp);
        if let Some(thumb) = thumb_tmp {
            // Usually already moved into the metadata dir by now.
            remove_if_present(thumb);
        }

        report
    }

    /// Install a boot video to `{root}/{slug}.webm`.
    ///
    /// Distinct boot videos carry distinct slugs, so an existing file is
    /// only ever a previous install of the same item; it is overwritten
    /// without a backup.
    pub fn install_boot(
        &self,
        source: &Path,
        slug: &str,
        item: Option<&CatalogItem>,
        thumb: Option<&Path>,
    ) -> InstallReport {
        self.ensure_directories();
        let dest = self.root.join(format!("{slug}.{VIDEO_EXT}"));

        match fs::copy(source, &dest) {
            Ok(_) => {
                if let Some(item) = item {
                    self.save_metadata(slug, item, thumb);
                }
                info!(dest = %dest.display(), "installed boot video");
                InstallReport::ok(format!("Installed to {}", dest.display()))
            }
            Err(e) => InstallReport::fail(format!("Failed to install {}: {e}", dest.display())),
        }
    }

    /// Install a suspend video to the single `deck-suspend-animation.webm`
    /// slot, renaming any existing occupant to `.webm.bak` first.
    pub fn install_suspend(
        &self,
        source: &Path,
        item: Option<&CatalogItem>,
        thumb: Option<&Path>,
    ) -> InstallReport {
        self.ensure_directories();
        let dest = self.root.join(SUSPEND_FILENAME);

        let mut backed_up = false;
        if dest.exists() {
            let backup = self.root.join(format!("{SUSPEND_FILENAME}.bak"));
            match fs::rename(&dest, &backup) {
                Ok(()) => {
                    info!(backup = %backup.display(), "backed up existing suspend video");
                    backed_up = true;
                }
                Err(e) => warn!(error = %e, "failed to back up existing suspend video"),
            }
        }

        match fs::copy(source, &dest) {
            Ok(_) => {
                if let Some(item) = item {
                    self.save_metadata(SUSPEND_META_KEY, item, thumb);
                }
                info!(dest = %dest.display(), "installed suspend video");
                let suffix = if backed_up { " (previous video backed up)" } else { "" };
                InstallReport::ok(format!("Installed to {}{suffix}", dest.display()))
            }
            Err(e) => InstallReport::fail(format!("Failed to install {}: {e}", dest.display())),
        }
    }

    /// Write the JSON sidecar and move the thumbnail into the metadata
    /// directory. Best-effort: failures are logged and swallowed.
    fn save_metadata(&self, key: &str, item: &CatalogItem, thumb: Option<&Path>) {
        let meta_dir = self.meta_dir();

        match serde_json::to_string(item) {
            Ok(json) => {
                let path = meta_dir.join(format!("{key}.json"));
                if let Err(e) = fs::write(&path, json) {
                    warn!(path = %path.display(), error = %e, "failed to write metadata sidecar");
                }
            }
            Err(e) => warn!(key, error = %e, "failed to serialize metadata sidecar"),
        }

        if let Some(thumb) = thumb {
            if thumb.exists() {
                let dest = meta_dir.join(format!("{key}.jpg"));
                remove_if_present(&dest);
                if let Err(e) = move_file(thumb, &dest) {
                    warn!(dest = %dest.display(), error = %e, "failed to store thumbnail");
                }
            }
        }
    }

    /// Scan the install root and return installed entries sorted by
    /// filename. Missing or corrupt sidecars leave `metadata` empty.
    pub fn list_installed(&self) -> Vec<InstalledEntry> {
        let mut entries = Vec::new();
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(_) => return entries,
        };
        let meta_dir = self.meta_dir();

        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(VIDEO_EXT) {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let (install_class, key) = classify(&filename);

            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);

            let metadata = fs::read_to_string(meta_dir.join(format!("{key}.json")))
                .ok()
                .and_then(|data| serde_json::from_str::<CatalogItem>(&data).ok());

            let thumb_path = meta_dir.join(format!("{key}.jpg"));
            let thumbnail = thumb_path.exists().then_some(thumb_path);

            entries.push(InstalledEntry {
                filename,
                install_class,
                size_bytes,
                metadata,
                thumbnail,
            });
        }

        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        entries
    }

    /// Remove an installed video and, best-effort, its sidecars.
    pub fn delete(&self, filename: &str) -> Result<String, FetchError> {
        let path = self.root.join(filename);
        if !path.is_file() {
            return Err(FetchError::NotFound(filename.to_owned()));
        }
        fs::remove_file(&path)?;

        let (_, key) = classify(filename);
        for ext in ["json", "jpg"] {
            remove_if_present(&self.meta_dir().join(format!("{key}.{ext}")));
        }

        info!(filename, "deleted installed video");
        Ok(format!("Deleted {filename}"))
    }
}

/// Map an installed filename to its install class and sidecar key.
fn classify(filename: &str) -> (InstallClass, String) {
    if filename == SUSPEND_FILENAME {
        (InstallClass::Suspend, SUSPEND_META_KEY.to_owned())
    } else {
        let key = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_owned());
        (InstallClass::Boot, key)
    }
}

fn remove_if_present(path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
}

/// Rename, falling back to copy-and-remove when the source lives on a
/// different filesystem (temp dirs often do).
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, slug: &str, kind: VideoKind) -> CatalogItem {
        CatalogItem {
            id: id.to_owned(),
            slug: slug.to_owned(),
            kind,
            title: format!("Title for {slug}"),
            description: String::new(),
            video_url: None,
            thumbnail_url: None,
            download_count: 0,
            like_count: 0,
            user: None,
        }
    }

    fn temp_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("write temp source");
        path
    }

    #[test]
    fn boot_install_places_asset_and_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let src = temp_source(dir.path(), "dl.webm", "video-bytes");
        let report = installer.install(&item("a1", "abc", VideoKind::BootVideo), &src, None);
        assert!(report.success, "install failed: {}", report.message);

        assert_eq!(
            fs::read_to_string(root.join("abc.webm")).expect("asset"),
            "video-bytes"
        );
        let sidecar = fs::read_to_string(root.join(".manager/abc.json")).expect("sidecar");
        assert!(sidecar.contains(r#""slug":"abc""#));

        // The installer owns the temp file.
        assert!(!src.exists(), "temp file should have been removed");
    }

    #[test]
    fn boot_reinstall_overwrites_without_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let first = temp_source(dir.path(), "dl1.webm", "old");
        installer.install(&item("a1", "abc", VideoKind::BootVideo), &first, None);
        let second = temp_source(dir.path(), "dl2.webm", "new");
        let report = installer.install(&item("a1", "abc", VideoKind::BootVideo), &second, None);
        assert!(report.success);

        assert_eq!(fs::read_to_string(root.join("abc.webm")).expect("asset"), "new");
        assert!(!root.join("abc.webm.bak").exists(), "boot installs never back up");
    }

    #[test]
    fn suspend_install_backs_up_existing_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let first = temp_source(dir.path(), "dl1.webm", "old-suspend");
        installer.install(
            &item("s1", "first-suspend", VideoKind::SuspendVideo),
            &first,
            None,
        );

        let second = temp_source(dir.path(), "dl2.webm", "new-suspend");
        let report = installer.install(
            &item("s2", "some-other-slug", VideoKind::SuspendVideo),
            &second,
            None,
        );
        assert!(report.success, "install failed: {}", report.message);

        assert_eq!(
            fs::read_to_string(root.join(SUSPEND_FILENAME)).expect("asset"),
            "new-suspend"
        );
        assert_eq!(
            fs::read_to_string(root.join("deck-suspend-animation.webm.bak")).expect("backup"),
            "old-suspend"
        );

        // Sidecar key is the fixed literal, not the item's own slug.
        let sidecar =
            fs::read_to_string(root.join(".manager/suspend.json")).expect("suspend sidecar");
        assert!(sidecar.contains(r#""slug":"some-other-slug""#));
        assert!(!root.join(".manager/some-other-slug.json").exists());
    }

    #[test]
    fn thumbnail_is_moved_into_metadata_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let src = temp_source(dir.path(), "dl.webm", "video");
        let thumb = temp_source(dir.path(), "dl.jpg", "jpeg-bytes");
        let report = installer.install(
            &item("a1", "abc", VideoKind::BootVideo),
            &src,
            Some(&thumb),
        );
        assert!(report.success);

        assert_eq!(
            fs::read_to_string(root.join(".manager/abc.jpg")).expect("thumbnail"),
            "jpeg-bytes"
        );
        assert!(!thumb.exists(), "thumbnail temp should have been moved");
    }

    #[test]
    fn missing_source_fails_without_raising() {
        let dir = tempfile::tempdir().expect("tempdir");
        let installer = Installer::new(dir.path().join("movies"));

        let report = installer.install(
            &item("a1", "abc", VideoKind::BootVideo),
            Path::new("/nonexistent/dl.webm"),
            None,
        );
        assert!(!report.success);
        assert!(!report.message.is_empty());
    }

    #[test]
    fn list_installed_classifies_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let boot = temp_source(dir.path(), "dl1.webm", "boot");
        installer.install(&item("a1", "zeta", VideoKind::BootVideo), &boot, None);
        let suspend = temp_source(dir.path(), "dl2.webm", "suspend");
        installer.install(&item("s1", "anything", VideoKind::SuspendVideo), &suspend, None);

        let entries = installer.list_installed();
        assert_eq!(entries.len(), 2);

        // Sorted ascending: deck-suspend-animation.webm before zeta.webm.
        assert_eq!(entries[0].filename, SUSPEND_FILENAME);
        assert_eq!(entries[0].install_class, InstallClass::Suspend);
        assert_eq!(entries[1].filename, "zeta.webm");
        assert_eq!(entries[1].install_class, InstallClass::Boot);

        assert_eq!(entries[0].size_bytes, "suspend".len() as u64);
        let meta = entries[1].metadata.as_ref().expect("boot sidecar metadata");
        assert_eq!(meta.title, "Title for zeta");
        assert!(entries[1].thumbnail.is_none());
    }

    #[test]
    fn list_installed_tolerates_corrupt_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let boot = temp_source(dir.path(), "dl1.webm", "boot");
        installer.install(&item("a1", "abc", VideoKind::BootVideo), &boot, None);
        fs::write(root.join(".manager/abc.json"), "{broken").expect("corrupt sidecar");

        let entries = installer.list_installed();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].metadata.is_none());
    }

    #[test]
    fn list_installed_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let installer = Installer::new(dir.path().join("never-created"));
        assert!(installer.list_installed().is_empty());
    }

    #[test]
    fn delete_removes_primary_and_sidecars() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let src = temp_source(dir.path(), "dl.webm", "video");
        let thumb = temp_source(dir.path(), "dl.jpg", "jpeg");
        installer.install(&item("a1", "abc", VideoKind::BootVideo), &src, Some(&thumb));

        let message = installer.delete("abc.webm").expect("delete should succeed");
        assert!(message.contains("abc.webm"));
        assert!(!root.join("abc.webm").exists());
        assert!(!root.join(".manager/abc.json").exists());
        assert!(!root.join(".manager/abc.jpg").exists());
    }

    #[test]
    fn delete_missing_file_is_not_found_and_changes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let src = temp_source(dir.path(), "dl.webm", "video");
        installer.install(&item("a1", "abc", VideoKind::BootVideo), &src, None);

        let err = installer.delete("missing.webm").expect_err("should fail");
        assert!(matches!(err, FetchError::NotFound(_)));
        assert!(root.join("abc.webm").exists(), "existing files untouched");
    }

    #[test]
    fn delete_suspend_uses_fixed_sidecar_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("movies");
        let installer = Installer::new(&root);

        let src = temp_source(dir.path(), "dl.webm", "video");
        installer.install(&item("s1", "whatever", VideoKind::SuspendVideo), &src, None);
        assert!(root.join(".manager/suspend.json").exists());

        installer.delete(SUSPEND_FILENAME).expect("delete");
        assert!(!root.join(".manager/suspend.json").exists());
    }
}
