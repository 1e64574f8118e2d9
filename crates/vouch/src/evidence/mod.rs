//! Durable evidence storage.
//!
//! An artifact is written exactly once per completed recording. Backends
//! refuse to overwrite an existing id, which is what keeps a resubmission
//! from producing a second copy.

mod disk;
mod memory;
mod redis_store;

pub use disk::DiskEvidenceStore;
pub use memory::MemoryEvidenceStore;
pub use redis_store::RedisEvidenceStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use vouch_common::{Challenge, EvidenceArtifact, EvidenceMetadata, VouchError};

use crate::capture::Recording;
use crate::config::{StoreBackend, StoreConfig};

/// Storage for evidence artifacts awaiting verification
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Persist a new artifact. Fails with `VouchError::Save` if the id exists.
    async fn put(&self, artifact: &EvidenceArtifact) -> Result<(), VouchError>;

    async fn get(&self, id: &str) -> Result<Option<EvidenceArtifact>, VouchError>;

    /// Remove an artifact; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool, VouchError>;

    /// Remove every artifact created before `cutoff`; returns how many
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, VouchError>;

    /// Backend reachability for readiness probes
    async fn health(&self) -> Result<(), VouchError> {
        Ok(())
    }
}

/// Open the configured backend
pub async fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn EvidenceStore>> {
    let store: Arc<dyn EvidenceStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryEvidenceStore::new()),
        StoreBackend::Disk => Arc::new(DiskEvidenceStore::open(&config.path).await?),
        StoreBackend::Redis => Arc::new(RedisEvidenceStore::connect(&config.redis_url).await?),
    };

    tracing::info!(backend = ?config.backend, "Evidence store ready");
    Ok(store)
}

/// What the session knew about the face when recording stopped
#[derive(Debug, Clone, Copy)]
pub struct FaceSummary {
    pub detected: bool,
    pub confidence: f32,
}

/// Package a finished recording as an artifact
pub fn assemble(
    id: &str,
    recording: Recording,
    challenges: &[Challenge],
    face: FaceSummary,
) -> EvidenceArtifact {
    let video_sha256 = hex_digest(&recording.bytes);
    let all_challenges_passed =
        !challenges.is_empty() && challenges.iter().all(|c| c.state.completed);

    EvidenceArtifact {
        id: id.to_string(),
        video_bytes: recording.bytes,
        challenge_summary: challenges.to_vec(),
        metadata: EvidenceMetadata {
            face_detected: face.detected,
            face_confidence: face.confidence,
            all_challenges_passed,
            recording_started_at: recording.started_at,
            recording_ended_at: recording.ended_at,
            video_sha256,
        },
        created_at: recording.ended_at,
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Ids become file names and redis keys, so only the url-safe alphabet is allowed
pub(crate) fn check_id(id: &str) -> Result<(), VouchError> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(VouchError::InvalidInput(format!("invalid artifact id: {:?}", id)))
    }
}

#[cfg(test)]
pub(crate) fn sample_artifact(id: &str, created_at: DateTime<Utc>) -> EvidenceArtifact {
    use vouch_common::{ChallengeDescriptor, Gesture};

    let mut blink = Challenge::new(ChallengeDescriptor::new(Gesture::Blink { repeat_count: 2 }));
    blink.state.apply(true, 1.0, created_at);

    assemble(
        id,
        Recording {
            bytes: b"chunk-0;chunk-1;".to_vec(),
            chunks: 2,
            started_at: created_at,
            ended_at: created_at,
        },
        &[blink],
        FaceSummary {
            detected: true,
            confidence: 0.95,
        },
    )
}
