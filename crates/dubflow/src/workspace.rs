//! Per-job scratch directories.
//!
//! Every job gets an isolated directory under the workspace root with the
//! layout the step handlers expect:
//!
//! ```text
//! <root>/<job_id>/
//!   source.<ext>          staged input media
//!   output/               produced artifacts
//!   output/audio/         per-chunk synthesized audio
//!   output/log/           tool logs from individual steps
//! ```
//!
//! The final artifacts are `output/output_dub.mp4` and, when subtitles were
//! generated, `output/dub.srt`. Release removes the whole directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::storage::{ObjectStorage, StorageError};

/// Relative path of the dubbed video artifact inside a workspace.
pub const DUBBED_VIDEO: &str = "output/output_dub.mp4";
/// Relative path of the subtitle artifact inside a workspace.
pub const SUBTITLE_FILE: &str = "output/dub.srt";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Missing artifact: {0}")]
    MissingArtifact(PathBuf),
}

/// Storage keys of the artifacts published for a finished job.
#[derive(Debug, Clone)]
pub struct PublishedArtifacts {
    pub dubbed_video_key: String,
    pub subtitles_key: Option<String>,
}

/// An acquired per-job scratch directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    job_id: String,
    path: PathBuf,
}

impl Workspace {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves a workspace-relative path.
    pub fn join(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path.join("output")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.path.join("output/audio")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.path.join("output/log")
    }

    pub fn dubbed_video_path(&self) -> PathBuf {
        self.path.join(DUBBED_VIDEO)
    }

    pub fn subtitles_path(&self) -> PathBuf {
        self.path.join(SUBTITLE_FILE)
    }
}

/// Creates, stages and tears down per-job workspaces.
#[derive(Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    storage: Arc<dyn ObjectStorage>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            root: root.into(),
            storage,
        }
    }

    /// Creates (or re-opens) the workspace for a job. Idempotent: an
    /// existing directory and its contents are kept, so a resumed job sees
    /// artifacts from already completed steps.
    pub async fn acquire(&self, job_id: &str) -> Result<Workspace, WorkspaceError> {
        let path = self.root.join(job_id);
        for dir in [
            path.clone(),
            path.join("output"),
            path.join("output/audio"),
            path.join("output/log"),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| WorkspaceError::Io {
                    path: dir.clone(),
                    source: e,
                })?;
        }

        log::debug!("Acquired workspace for job {} at {}", job_id, path.display());
        Ok(Workspace {
            job_id: job_id.to_string(),
            path,
        })
    }

    /// Downloads the source object into the workspace and returns its local
    /// path. Skipped when the file is already present from a previous run.
    pub async fn stage_input(
        &self,
        workspace: &Workspace,
        source_ref: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let file_name = Path::new(source_ref)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source.mp4".to_string());
        let dest = workspace.join(&file_name);

        if dest.exists() {
            log::debug!(
                "Source already staged for job {}, skipping download",
                workspace.job_id()
            );
            return Ok(dest);
        }

        self.storage.download(source_ref, &dest).await?;
        Ok(dest)
    }

    /// Uploads the final artifacts under `jobs/<job_id>/` and returns their
    /// storage keys. The dubbed video is required; subtitles are published
    /// only when present.
    pub async fn publish_outputs(
        &self,
        workspace: &Workspace,
    ) -> Result<PublishedArtifacts, WorkspaceError> {
        let video = workspace.dubbed_video_path();
        if !video.exists() {
            return Err(WorkspaceError::MissingArtifact(video));
        }

        let video_key = format!("jobs/{}/output_dub.mp4", workspace.job_id());
        self.storage.upload(&video, &video_key).await?;

        let subtitles = workspace.subtitles_path();
        let subtitles_key = if subtitles.exists() {
            let key = format!("jobs/{}/dub.srt", workspace.job_id());
            self.storage.upload(&subtitles, &key).await?;
            Some(key)
        } else {
            None
        };

        Ok(PublishedArtifacts {
            dubbed_video_key: video_key,
            subtitles_key,
        })
    }

    /// Removes the job's workspace directory. Idempotent.
    pub async fn release(&self, workspace: &Workspace) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_dir_all(workspace.path()).await {
            Ok(()) => {
                log::debug!("Released workspace for job {}", workspace.job_id());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::Io {
                path: workspace.path().to_path_buf(),
                source: e,
            }),
        }
    }
}
