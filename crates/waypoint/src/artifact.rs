//! Artifact capture: screenshots and console logs written at checkpoints.
//!
//! Files land in `<output_dir>/<scenario>/` as `<NN>_<tag>.png` (and
//! `<NN>_<tag>.log` for console output), where `NN` is the zero-padded step
//! index. Names are deterministic for a given scenario and step list, and a
//! repeated name within one run gets a numeric suffix.

use crate::driver::PageDriver;
use crate::result::{WaypointError, WaypointResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Kind of captured file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Full-page PNG
    Screenshot,
    /// Console messages and page errors, one per line
    ConsoleLog,
}

/// A file written during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Kind
    pub kind: ArtifactKind,
    /// Checkpoint tag
    pub tag: String,
    /// Step index the capture belongs to
    pub step: usize,
    /// Location on disk
    pub path: PathBuf,
    /// Written from a failure handler
    pub failure: bool,
}

/// Lowercase a tag and replace anything outside `[a-z0-9_-]` with `_`
#[must_use]
pub fn sanitize_tag(tag: &str) -> String {
    let cleaned: String = tag
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "capture".to_string()
    } else {
        cleaned
    }
}

/// Writes artifacts for one scenario run
#[derive(Debug)]
pub struct ArtifactCapturer {
    dir: PathBuf,
    taken: HashSet<PathBuf>,
    artifacts: Vec<Artifact>,
}

impl ArtifactCapturer {
    /// Capturer writing under `<output_dir>/<scenario>`
    #[must_use]
    pub fn new(output_dir: impl AsRef<Path>, scenario: &str) -> Self {
        Self {
            dir: output_dir.as_ref().join(sanitize_tag(scenario)),
            taken: HashSet::new(),
            artifacts: Vec::new(),
        }
    }

    /// Directory artifacts are written to
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Everything captured so far
    #[must_use]
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Consume the capturer, returning its artifacts
    #[must_use]
    pub fn into_artifacts(self) -> Vec<Artifact> {
        self.artifacts
    }

    fn reserve(&mut self, step: usize, tag: &str, ext: &str) -> PathBuf {
        let stem = format!("{step:02}_{}", sanitize_tag(tag));
        let mut path = self.dir.join(format!("{stem}.{ext}"));
        let mut n = 2;
        while self.taken.contains(&path) {
            path = self.dir.join(format!("{stem}_{n}.{ext}"));
            n += 1;
        }
        self.taken.insert(path.clone());
        path
    }

    async fn write(&mut self, artifact: Artifact, bytes: &[u8]) -> WaypointResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&artifact.path, bytes).await?;
        debug!(path = %artifact.path.display(), bytes = bytes.len(), "artifact written");
        let path = artifact.path.clone();
        self.artifacts.push(artifact);
        Ok(path)
    }

    /// Full-page screenshot tagged `tag` for step `step`
    ///
    /// # Errors
    ///
    /// Fails when the page is gone or the file cannot be written.
    pub async fn capture<P: PageDriver + ?Sized>(
        &mut self,
        page: &P,
        step: usize,
        tag: &str,
        failure: bool,
    ) -> WaypointResult<PathBuf> {
        let png = page.screenshot().await.map_err(|e| match e {
            WaypointError::Screenshot { .. } => e,
            other => WaypointError::Screenshot {
                message: other.to_string(),
            },
        })?;
        let path = self.reserve(step, tag, "png");
        let artifact = Artifact {
            kind: ArtifactKind::Screenshot,
            tag: tag.to_string(),
            step,
            path,
            failure,
        };
        let path = self.write(artifact, &png).await?;
        info!(path = %path.display(), failure, "screenshot captured");
        Ok(path)
    }

    /// Write the page's console messages; `None` when there were none
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub async fn capture_console<P: PageDriver + ?Sized>(
        &mut self,
        page: &P,
        step: usize,
        tag: &str,
        failure: bool,
    ) -> WaypointResult<Option<PathBuf>> {
        let messages = page.console_messages().await;
        if messages.is_empty() {
            return Ok(None);
        }
        let body: String = messages.iter().map(|m| format!("{m}\n")).collect();
        let path = self.reserve(step, tag, "log");
        let artifact = Artifact {
            kind: ArtifactKind::ConsoleLog,
            tag: tag.to_string(),
            step,
            path,
            failure,
        };
        let errors = messages.iter().filter(|m| m.is_error()).count();
        let path = self.write(artifact, body.as_bytes()).await?;
        info!(path = %path.display(), messages = messages.len(), errors, "console log captured");
        Ok(Some(path))
    }
}
