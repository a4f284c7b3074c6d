// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Persistence of rendered overlays

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::overlay::{OverlayArtifact, RenderError};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Overlay rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to write overlay to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for debug overlays
pub trait ArtifactSink: Send + Sync {
    /// Store the artifact for `request_id`, returning where it went
    fn persist(
        &self,
        request_id: Uuid,
        artifact: &OverlayArtifact,
    ) -> Result<PathBuf, ArtifactError>;
}

/// File name of the latest overlay
pub const ARTIFACT_FILE_NAME: &str = "debug_output.jpg";

/// Keeps the latest overlay as `debug_output.jpg` in a directory
///
/// Each write goes to a temporary file in the same directory and is then
/// renamed over the previous overlay, so readers never see a partial image
/// and the directory holds a single artifact however many requests run.
#[derive(Debug, Clone)]
pub struct FileArtifactSink {
    dir: PathBuf,
}

impl FileArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(ARTIFACT_FILE_NAME)
    }
}

impl ArtifactSink for FileArtifactSink {
    fn persist(
        &self,
        request_id: Uuid,
        artifact: &OverlayArtifact,
    ) -> Result<PathBuf, ArtifactError> {
        let bytes = artifact.to_jpeg_bytes()?;

        std::fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path();
        let io_error = |source| ArtifactError::Io {
            path: path.clone(),
            source,
        };

        let mut staged = NamedTempFile::new_in(&self.dir).map_err(io_error)?;
        staged.write_all(&bytes).map_err(io_error)?;
        staged.persist(&path).map_err(|e| io_error(e.error))?;

        debug!(
            "[{}] Wrote overlay with {} boxes to {} ({} bytes)",
            request_id,
            artifact.box_count,
            path.display(),
            bytes.len()
        );
        Ok(path)
    }
}
