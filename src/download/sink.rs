//! Destinations for assembled artifacts

use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// A fully assembled download
#[derive(Clone, Debug)]
pub struct Artifact {
    /// Resolved filename
    pub filename: String,
    /// Declared content type, `application/octet-stream` when absent
    pub content_type: String,
    /// The complete payload
    pub data: Bytes,
}

/// Save/consume step a finished download is handed to
#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store the artifact, returning where it ended up if it has a location
    async fn save(&self, artifact: &Artifact) -> Result<Option<PathBuf>>;
}

/// Writes artifacts into a directory, never overwriting existing files
///
/// A name that is already taken gets a numeric suffix: `slides.pptx`
/// becomes `slides (1).pptx`, then `slides (2).pptx`, and so on.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `dir` (created on first save)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl ArtifactSink for DirectorySink {
    async fn save(&self, artifact: &Artifact) -> Result<Option<PathBuf>> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = sanitize_filename(&artifact.filename);
        let path = unique_path(&self.dir.join(name))?;
        tokio::fs::write(&path, &artifact.data).await?;

        tracing::debug!(
            path = %path.display(),
            bytes = artifact.data.len(),
            "artifact written"
        );
        Ok(Some(path))
    }
}

/// Keeps artifacts in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<Artifact>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything saved so far, oldest first
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().clone()
    }

    /// Remove and return everything saved so far
    pub fn take(&self) -> Vec<Artifact> {
        std::mem::take(&mut *self.artifacts.lock())
    }
}

#[async_trait::async_trait]
impl ArtifactSink for MemorySink {
    async fn save(&self, artifact: &Artifact) -> Result<Option<PathBuf>> {
        self.artifacts.lock().push(artifact.clone());
        Ok(None)
    }
}

/// Reduce a server-supplied name to a single safe path component
///
/// Directory parts are dropped, so `../../etc/passwd` becomes `passwd`.
/// Names that reduce to nothing become `download`.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// First free variant of `path`: the path itself, then `stem (1).ext`, `stem (2).ext`, ...
pub fn unique_path(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Other(format!("cannot extract file stem of {}", path.display())))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().ok_or_else(|| {
        Error::Other(format!("cannot extract parent directory of {}", path.display()))
    })?;

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = parent.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::Other(format!(
        "could not find a free filename for {} after {MAX_RENAME_ATTEMPTS} attempts",
        path.display()
    )))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(name: &str, data: &'static [u8]) -> Artifact {
        Artifact {
            filename: name.to_string(),
            content_type: "application/vnd.openxmlformats-officedocument.presentationml.presentation"
                .to_string(),
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn directory_sink_renames_on_collision() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path().join("out"));

        let first = sink.save(&artifact("slides.pptx", b"one")).await.unwrap().unwrap();
        let second = sink.save(&artifact("slides.pptx", b"two")).await.unwrap().unwrap();
        let third = sink.save(&artifact("slides.pptx", b"three")).await.unwrap().unwrap();

        assert_eq!(first.file_name().unwrap(), "slides.pptx");
        assert_eq!(second.file_name().unwrap(), "slides (1).pptx");
        assert_eq!(third.file_name().unwrap(), "slides (2).pptx");
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&third).unwrap(), b"three");
    }

    #[tokio::test]
    async fn directory_sink_keeps_names_inside_the_directory() {
        let temp = TempDir::new().unwrap();
        let sink = DirectorySink::new(temp.path());

        let path = sink
            .save(&artifact("../../escape.pptx", b"x"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(path, temp.path().join("escape.pptx"));
    }

    #[test]
    fn unique_path_without_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("README");
        std::fs::write(&path, b"x").unwrap();

        assert_eq!(unique_path(&path).unwrap(), temp.path().join("README (1)"));
    }

    #[test]
    fn sanitize_strips_directories_and_control_chars() {
        assert_eq!(sanitize_filename("a/b/c.pptx"), "c.pptx");
        assert_eq!(sanitize_filename("C:\\Users\\x\\deck.pptx"), "deck.pptx");
        assert_eq!(sanitize_filename("bad\nname.pdf"), "badname.pdf");
        assert_eq!(sanitize_filename(".."), "download");
        assert_eq!(sanitize_filename("dir/"), "download");
        assert_eq!(sanitize_filename("résumé.pptx"), "résumé.pptx");
    }

    #[tokio::test]
    async fn memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        assert!(sink.save(&artifact("a.pptx", b"a")).await.unwrap().is_none());
        sink.save(&artifact("b.pptx", b"b")).await.unwrap();

        let names: Vec<_> = sink.artifacts().into_iter().map(|a| a.filename).collect();
        assert_eq!(names, vec!["a.pptx", "b.pptx"]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.artifacts().is_empty());
    }
}
