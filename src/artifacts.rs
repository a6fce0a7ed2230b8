//! Artifact Lifecycle
//!
//! Every temporary file the bot touches (an upload, a conversion output,
//! an intermediate) lives under one scratch directory and is owned by an
//! [`Artifact`] guard. The guard removes its file exactly once: either via
//! an explicit [`Artifact::dispose`] or when it is dropped, so early returns
//! and error branches cannot leak scratch files.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `<origin>_<8 hex>_<name>`, as produced by [`ArtifactStore::reserve`]
/// and everything derived from it
static ARTIFACT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Za-z.-]+_[0-9a-f]{8}_.+$").expect("artifact name regex")
});

/// Where an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Document,
    Photo,
    Video,
    /// Produced by a conversion capability
    Generated,
}

/// Owning handle to a temporary file under scratch storage
#[derive(Debug)]
pub struct Artifact {
    path: Option<PathBuf>,
    kind: ArtifactKind,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// File name component, used as the upload name when sending back
    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string()
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Remove the file now
    pub fn dispose(mut self) {
        if let Some(path) = self.path.take() {
            dispose(&path);
        }
    }

    /// Release ownership without removing the file.
    ///
    /// The caller becomes responsible for disposal; the session slot uses
    /// this to hold an upload between events.
    pub fn into_path(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            dispose(&path);
        }
    }
}

/// Remove a file if present. Never fails: an already-removed file is fine,
/// anything else is logged.
pub fn dispose(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Disposed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to dispose {}: {}", path.display(), e),
    }
}

/// Factory for artifacts under one scratch directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: Arc<PathBuf>,
}

impl ArtifactStore {
    /// Open (creating if needed) the scratch directory
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root: Arc::new(root) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to a fresh, uniquely named file
    pub async fn acquire(
        &self,
        kind: ArtifactKind,
        origin: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> io::Result<Artifact> {
        let artifact = self.reserve_kind(kind, origin, file_name);
        // On failure the guard drops and removes any partial file
        tokio::fs::write(artifact.path(), bytes).await?;
        tracing::debug!("Stored {} ({} bytes)", artifact.path().display(), bytes.len());
        Ok(artifact)
    }

    /// Name a not-yet-existing output file for a capability to write
    pub fn reserve(&self, origin: &str, file_name: &str) -> Artifact {
        self.reserve_kind(ArtifactKind::Generated, origin, file_name)
    }

    /// Name an output next to `input`: same stem plus `suffix`
    /// (e.g. `_nobg.png`, `.pdf`).
    ///
    /// A stem already under scratch storage is kept verbatim, since tools
    /// such as LibreOffice name their output after it.
    pub fn derive(&self, input: &Path, suffix: &str) -> Artifact {
        let stem = input.file_stem().and_then(|s| s.to_str());
        let stem = match stem {
            Some(stem) if input.parent() == Some(self.root.as_path()) => stem.to_string(),
            Some(stem) => sanitize_file_name(stem),
            None => "artifact".to_string(),
        };
        Artifact {
            path: Some(self.root.join(format!("{}{}", stem, suffix))),
            kind: ArtifactKind::Generated,
        }
    }

    /// Take ownership of an existing scratch file (e.g. one produced by a
    /// tool that picks its own output names). Paths outside scratch
    /// storage are refused so disposal can never touch them.
    pub fn adopt(&self, path: impl Into<PathBuf>, kind: ArtifactKind) -> Option<Artifact> {
        let path = path.into();
        if !path.starts_with(self.root.as_path()) {
            tracing::warn!("Refusing to adopt {} outside scratch storage", path.display());
            return None;
        }
        Some(Artifact {
            path: Some(path),
            kind,
        })
    }

    /// Remove every artifact left in scratch storage.
    ///
    /// Sessions do not survive restarts, so at startup nothing in here is
    /// reachable anymore. Only names this store hands out are touched;
    /// other files in a shared directory are left alone.
    pub fn sweep(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(self.root.as_path())? {
            let entry = entry?;
            let owned = entry
                .file_name()
                .to_str()
                .map(|name| ARTIFACT_NAME.is_match(name))
                .unwrap_or(false);
            if owned && entry.file_type()?.is_file() {
                dispose(&entry.path());
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn reserve_kind(&self, kind: ArtifactKind, origin: &str, file_name: &str) -> Artifact {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}_{}_{}",
            sanitize_file_name(origin),
            &unique[..8],
            sanitize_file_name(file_name)
        );
        Artifact {
            path: Some(self.root.join(name)),
            kind,
        }
    }
}

/// Keep a file name safe for use inside scratch storage: no separators,
/// no leading dots, bounded length.
pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return "file".to_string();
    }
    // Keep the extension when shortening
    if cleaned.chars().count() > 80 {
        let ext = Path::new(cleaned)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.len() <= 10)
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let head: String = cleaned.chars().take(80 - ext.len()).collect();
        return format!("{}{}", head, ext);
    }
    cleaned.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("scratch")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_acquire_creates_unique_files() {
        let (_dir, store) = store();
        let a = store.acquire(ArtifactKind::Document, "17", "report.pdf", b"%PDF").await.unwrap();
        let b = store.acquire(ArtifactKind::Document, "17", "report.pdf", b"%PDF").await.unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.exists() && b.exists());
        assert!(a.path().starts_with(store.root()));
        assert!(a.file_name().starts_with("17_"));
        assert!(a.file_name().ends_with("_report.pdf"));
    }

    #[tokio::test]
    async fn test_drop_disposes() {
        let (_dir, store) = store();
        let path = {
            let a = store.acquire(ArtifactKind::Photo, "1", "x.jpg", b"jpg").await.unwrap();
            a.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_into_path_keeps_file() {
        let (_dir, store) = store();
        let a = store.acquire(ArtifactKind::Video, "1", "x.mp4", b"mp4").await.unwrap();
        let path = a.into_path();
        assert!(path.exists());

        let adopted = store.adopt(&path, ArtifactKind::Video).unwrap();
        adopted.dispose();
        assert!(!path.exists());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (_dir, store) = store();
        let path = store.root().join("gone.txt");
        dispose(&path);
        std::fs::write(&path, b"x").unwrap();
        dispose(&path);
        dispose(&path);
        assert!(!path.exists());
    }

    #[test]
    fn test_adopt_refuses_outside_paths() {
        let (dir, store) = store();
        let outside = dir.path().join("keep.txt");
        std::fs::write(&outside, b"x").unwrap();
        assert!(store.adopt(&outside, ArtifactKind::Generated).is_none());
        assert!(outside.exists());
    }

    #[test]
    fn test_derive_uses_input_stem() {
        let (_dir, store) = store();
        let out = store.derive(Path::new("/tmp/5_abcd1234_photo.jpg"), "_nobg.png");
        assert_eq!(out.file_name(), "5_abcd1234_photo_nobg.png");
        assert!(out.path().starts_with(store.root()));
        assert!(!out.exists());
    }

    #[test]
    fn test_derive_keeps_long_scratch_stem() {
        let (_dir, store) = store();
        let name = "annual_financial_statement_of_the_company_for_fiscal_year_2024_final_v2_signed.pdf";
        let input = store.reserve("123456", name);
        let stem = input.path().file_stem().unwrap().to_str().unwrap().to_string();
        assert!(stem.chars().count() > 80);

        let out = store.derive(input.path(), ".docx");
        assert_eq!(out.file_name(), format!("{}.docx", stem));
    }

    #[test]
    fn test_derive_sanitizes_outside_stem() {
        let (_dir, store) = store();
        let out = store.derive(Path::new("/elsewhere/my report.pdf"), ".docx");
        assert_eq!(out.file_name(), "my_report.docx");
        assert!(out.path().starts_with(store.root()));
    }

    #[tokio::test]
    async fn test_sweep_spares_unrelated_files() {
        let (_dir, store) = store();
        let a = store.acquire(ArtifactKind::Document, "1", "a.pdf", b"a").await.unwrap();
        let derived = store.derive(a.path(), "_page-1.png");
        std::fs::write(derived.path(), b"p").unwrap();
        let (pa, pd) = (a.into_path(), derived.into_path());

        let unrelated = ["notes.txt", "build_output.log", "1_nothex00_x.pdf"];
        for name in unrelated {
            std::fs::write(store.root().join(name), b"keep").unwrap();
        }
        std::fs::create_dir(store.root().join("9_abcdef01_dir")).unwrap();

        assert_eq!(store.sweep().unwrap(), 2);
        assert!(!pa.exists() && !pd.exists());
        for name in unrelated {
            assert!(store.root().join(name).exists(), "{} was removed", name);
        }
        assert!(store.root().join("9_abcdef01_dir").is_dir());
    }

    #[tokio::test]
    async fn test_sweep_removes_leftovers() {
        let (_dir, store) = store();
        let a = store.acquire(ArtifactKind::Document, "1", "a.pdf", b"a").await.unwrap();
        let b = store.acquire(ArtifactKind::Document, "2", "b.pdf", b"b").await.unwrap();
        let (pa, pb) = (a.into_path(), b.into_path());

        assert_eq!(store.sweep().unwrap(), 2);
        assert!(!pa.exists() && !pb.exists());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my report (final).pdf"), "my_report__final_.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "file");

        let long = format!("{}.docx", "a".repeat(200));
        let short = sanitize_file_name(&long);
        assert!(short.ends_with(".docx"));
        assert_eq!(short.chars().count(), 80);
    }
}
