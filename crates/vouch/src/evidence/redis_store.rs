//! Redis-backed evidence store.
//!
//! Artifacts live under `evidence:{id}` as JSON. A sorted set scored by
//! creation time (ms) indexes them for the retention sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use vouch_common::constants::redis_keys::{EVIDENCE_INDEX, EVIDENCE_PREFIX};
use vouch_common::{EvidenceArtifact, VouchError};

use super::{EvidenceStore, check_id};

pub struct RedisEvidenceStore {
    redis: redis::aio::ConnectionManager,
}

impl RedisEvidenceStore {
    pub async fn connect(url: &str) -> Result<Self, VouchError> {
        let client = redis::Client::open(url).map_err(store_error)?;
        let redis = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(store_error)?;

        tracing::info!("Connected to Redis evidence store");
        Ok(Self { redis })
    }

    fn key(id: &str) -> Result<String, VouchError> {
        check_id(id)?;
        Ok(format!("{}{}", EVIDENCE_PREFIX, id))
    }
}

#[async_trait]
impl EvidenceStore for RedisEvidenceStore {
    async fn put(&self, artifact: &EvidenceArtifact) -> Result<(), VouchError> {
        let key = Self::key(&artifact.id)?;
        let data = serde_json::to_string(artifact)?;
        let mut redis = self.redis.clone();

        let created: bool = redis.set_nx(&key, &data).await.map_err(store_error)?;
        if !created {
            return Err(VouchError::Save(format!("artifact {} already stored", artifact.id)));
        }
        redis
            .zadd::<_, _, _, ()>(EVIDENCE_INDEX, &artifact.id, artifact.created_at.timestamp_millis())
            .await
            .map_err(store_error)?;

        tracing::debug!(id = %artifact.id, "Evidence written to Redis");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<EvidenceArtifact>, VouchError> {
        let key = Self::key(id)?;
        let mut redis = self.redis.clone();
        let data: Option<String> = redis.get(&key).await.map_err(store_error)?;

        match data {
            Some(d) => Ok(Some(serde_json::from_str(&d)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, VouchError> {
        let key = Self::key(id)?;
        let mut redis = self.redis.clone();
        let removed: u64 = redis.del(&key).await.map_err(store_error)?;
        redis
            .zrem::<_, _, ()>(EVIDENCE_INDEX, id)
            .await
            .map_err(store_error)?;
        Ok(removed > 0)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, VouchError> {
        let mut redis = self.redis.clone();
        // Exclusive upper bound: artifacts created exactly at the cutoff stay
        let max = format!("({}", cutoff.timestamp_millis());
        let ids: Vec<String> = redis
            .zrangebyscore(EVIDENCE_INDEX, "-inf", max)
            .await
            .map_err(store_error)?;

        if ids.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{}{}", EVIDENCE_PREFIX, id))
            .collect();
        redis.del::<_, ()>(&keys).await.map_err(store_error)?;
        redis
            .zrem::<_, _, ()>(EVIDENCE_INDEX, &ids)
            .await
            .map_err(store_error)?;

        tracing::info!(removed = ids.len(), "Expired evidence removed");
        Ok(ids.len())
    }

    async fn health(&self) -> Result<(), VouchError> {
        let mut redis = self.redis.clone();
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut redis).await;
        pong.map(|_| ()).map_err(store_error)
    }
}

fn store_error(err: redis::RedisError) -> VouchError {
    VouchError::Store(err.to_string())
}
