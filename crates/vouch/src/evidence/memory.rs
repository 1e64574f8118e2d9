//! In-process evidence store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use vouch_common::{EvidenceArtifact, VouchError};

use super::EvidenceStore;

/// Keeps artifacts in memory; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    artifacts: RwLock<HashMap<String, EvidenceArtifact>>,
    writes: AtomicUsize,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful `put` calls since creation
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn put(&self, artifact: &EvidenceArtifact) -> Result<(), VouchError> {
        let mut artifacts = self.artifacts.write().await;
        if artifacts.contains_key(&artifact.id) {
            return Err(VouchError::Save(format!("artifact {} already stored", artifact.id)));
        }
        artifacts.insert(artifact.id.clone(), artifact.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<EvidenceArtifact>, VouchError> {
        Ok(self.artifacts.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, VouchError> {
        Ok(self.artifacts.write().await.remove(id).is_some())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, VouchError> {
        let mut artifacts = self.artifacts.write().await;
        let before = artifacts.len();
        artifacts.retain(|_, artifact| artifact.created_at >= cutoff);
        Ok(before - artifacts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::sample_artifact;
    use chrono::Duration;

    #[tokio::test]
    async fn test_put_refuses_overwrite() {
        let store = MemoryEvidenceStore::new();
        let artifact = sample_artifact("s1", Utc::now());

        store.put(&artifact).await.unwrap();
        let err = store.put(&artifact).await.unwrap_err();
        assert!(matches!(err, VouchError::Save(_)));
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get("s1").await.unwrap(), Some(artifact));
    }

    #[tokio::test]
    async fn test_sweep_keeps_recent() {
        let store = MemoryEvidenceStore::new();
        let now = Utc::now();
        store.put(&sample_artifact("old", now - Duration::days(2))).await.unwrap();
        store.put(&sample_artifact("new", now)).await.unwrap();

        let removed = store.delete_older_than(now - Duration::days(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryEvidenceStore::new();
        store.put(&sample_artifact("s1", Utc::now())).await.unwrap();
        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.is_empty().await);
    }
}
