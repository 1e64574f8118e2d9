//! Filesystem evidence store.
//!
//! One JSON document per artifact, named `{id}.json`. Writes go to a
//! temporary file first and are renamed into place, so a crash never
//! leaves a half-written artifact under its final name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use vouch_common::{EvidenceArtifact, VouchError};

use super::{EvidenceStore, check_id};

const EXTENSION: &str = "json";
const TMP_EXTENSION: &str = "json.tmp";

/// Just enough of an artifact to decide whether it has expired
#[derive(Deserialize)]
struct ArtifactHeader {
    created_at: DateTime<Utc>,
}

pub struct DiskEvidenceStore {
    dir: PathBuf,
}

impl DiskEvidenceStore {
    /// Open (and create if needed) the evidence directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, VouchError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error("create evidence dir", &dir, e))?;

        tracing::debug!(dir = ?dir, "Disk evidence store opened");
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, VouchError> {
        check_id(id)?;
        Ok(self.dir.join(format!("{}.{}", id, EXTENSION)))
    }

    async fn expired(&self, path: &Path, cutoff: DateTime<Utc>) -> Result<bool, VouchError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| io_error("read", path, e))?;

        match serde_json::from_slice::<ArtifactHeader>(&data) {
            Ok(header) => Ok(header.created_at < cutoff),
            Err(e) => {
                // Unreadable documents age out by modification time
                tracing::warn!(path = ?path, error = %e, "Unparseable evidence file");
                let modified = tokio::fs::metadata(path)
                    .await
                    .and_then(|m| m.modified())
                    .map_err(|e| io_error("stat", path, e))?;
                Ok(DateTime::<Utc>::from(modified) < cutoff)
            }
        }
    }
}

#[async_trait]
impl EvidenceStore for DiskEvidenceStore {
    async fn put(&self, artifact: &EvidenceArtifact) -> Result<(), VouchError> {
        let path = self.path_for(&artifact.id)?;
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error("stat", &path, e))?
        {
            return Err(VouchError::Save(format!("artifact {} already stored", artifact.id)));
        }

        let data = serde_json::to_vec(artifact)?;
        let tmp = path.with_extension(TMP_EXTENSION);
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error("rename", &path, e));
        }

        tracing::debug!(id = %artifact.id, bytes = data.len(), "Evidence written to disk");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<EvidenceArtifact>, VouchError> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read", &path, e)),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, VouchError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("remove", &path, e)),
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, VouchError> {
        let mut read_dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error("list", &self.dir, e))?;

        let mut removed = 0;
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_error("list", &self.dir, e))?
        {
            let path = entry.path();
            if !is_evidence_file(&path) {
                continue;
            }

            match self.expired(&path, cutoff).await {
                Ok(true) => match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to remove expired evidence"),
                },
                Ok(false) => {}
                Err(e) => tracing::warn!(path = ?path, error = %e, "Skipping evidence file"),
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, "Expired evidence removed");
        }
        Ok(removed)
    }

    async fn health(&self) -> Result<(), VouchError> {
        tokio::fs::metadata(&self.dir)
            .await
            .map(|_| ())
            .map_err(|e| io_error("stat", &self.dir, e))
    }
}

/// Stored artifacts plus temporaries orphaned by an interrupted `put`
fn is_evidence_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    [EXTENSION, TMP_EXTENSION]
        .iter()
        .any(|ext| name.strip_suffix(ext).is_some_and(|stem| stem.ends_with('.')))
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> VouchError {
    VouchError::Store(format!("{} {}: {}", action, path.display(), err))
}
