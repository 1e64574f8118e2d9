//! Delivery of evidence to the remote verification endpoint.
//!
//! The endpoint either answers with a verdict straight away (200) or
//! accepts the evidence for asynchronous review (202) and hands back a
//! URL to poll. Polling never gives up on its own; the caller bounds it
//! with the processing timeout.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vouch_common::{EvidenceArtifact, Verdict, VouchError};

use crate::config::SubmissionConfig;

/// Transmits an artifact and waits for the verdict
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    async fn submit(&self, user_id: &str, artifact: &EvidenceArtifact) -> Result<Verdict, VouchError>;
}

#[derive(Serialize)]
struct SubmissionPayload<'a> {
    user_id: &'a str,
    session_id: &'a str,
    #[serde(flatten)]
    artifact: &'a EvidenceArtifact,
}

#[derive(Debug, Deserialize)]
struct VerdictResponse {
    accepted: bool,
    #[serde(default)]
    reason: Option<String>,
}

impl From<VerdictResponse> for Verdict {
    fn from(response: VerdictResponse) -> Self {
        if response.accepted {
            Verdict::Accepted
        } else {
            Verdict::Rejected {
                reason: response.reason,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PendingResponse {
    poll_url: String,
}

/// JSON-over-HTTPS submission client
pub struct HttpSubmissionClient {
    client: reqwest::Client,
    endpoint: Url,
    poll_interval: Duration,
}

impl HttpSubmissionClient {
    pub fn new(config: &SubmissionConfig) -> Result<Self, VouchError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| VouchError::Config(format!("submission endpoint: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| VouchError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    async fn poll(&self, poll_url: &str) -> Result<Verdict, VouchError> {
        let url = self
            .endpoint
            .join(poll_url)
            .map_err(|e| VouchError::Submission(format!("bad poll url {:?}: {}", poll_url, e)))?;

        let mut polls = 0u32;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            let response = self.client.get(url.clone()).send().await.map_err(transport_error)?;
            match response.status() {
                StatusCode::OK => {
                    let body: VerdictResponse = response.json().await.map_err(transport_error)?;
                    tracing::debug!(polls = polls, accepted = body.accepted, "Verdict ready");
                    return Ok(body.into());
                }
                StatusCode::ACCEPTED => {
                    tracing::trace!(polls = polls, "Verdict still pending");
                }
                status => {
                    return Err(VouchError::Submission(format!(
                        "verdict poll returned {}",
                        status
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl SubmissionClient for HttpSubmissionClient {
    async fn submit(&self, user_id: &str, artifact: &EvidenceArtifact) -> Result<Verdict, VouchError> {
        let payload = SubmissionPayload {
            user_id,
            session_id: &artifact.id,
            artifact,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let body: VerdictResponse = response.json().await.map_err(transport_error)?;
                Ok(body.into())
            }
            StatusCode::ACCEPTED => {
                let pending: PendingResponse = response.json().await.map_err(transport_error)?;
                tracing::info!(id = %artifact.id, "Evidence queued for review, polling for verdict");
                self.poll(&pending.poll_url).await
            }
            status => Err(VouchError::Submission(format!(
                "verification endpoint returned {}",
                status
            ))),
        }
    }
}

fn transport_error(err: reqwest::Error) -> VouchError {
    if err.is_connect() {
        VouchError::Submission("cannot reach verification endpoint".to_string())
    } else {
        VouchError::Submission(err.to_string())
    }
}
