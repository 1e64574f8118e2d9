//! Configuration management for Vouch.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use vouch_common::constants::{
    DEFAULT_BLINK_COUNT, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, DETECTOR_ATTEMPT_TIMEOUT_MS,
    DETECTOR_BACKOFF_MS, DETECTOR_MAX_ATTEMPTS, EVIDENCE_RETENTION_SECS, MAX_CHALLENGES,
    MIN_CHALLENGES, PASS_THRESHOLD, PER_CHALLENGE_ALLOWANCE_MS, PRESENCE_THRESHOLD,
    PROCESSING_TIMEOUT_MS, RECORDING_GRACE_MS, SAMPLE_INTERVAL_MS,
};
use vouch_common::Gesture;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Loopback HTTP listen address for the host UI
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Landmark trace replayed by the bundled capture adapter
    #[serde(default)]
    pub trace_path: Option<String>,

    /// Session timing
    #[serde(default)]
    pub session: SessionConfig,

    /// Gesture validation thresholds
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Challenge sequence shape
    #[serde(default)]
    pub challenges: ChallengeConfig,

    /// Evidence persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Verification endpoint
    #[serde(default)]
    pub submission: SubmissionConfig,
}

/// Session state machine timing
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Landmark-source readiness attempts
    #[serde(default = "default_init_max_attempts")]
    pub init_max_attempts: u32,

    /// Wait between readiness attempts
    #[serde(default = "default_init_backoff_ms")]
    pub init_backoff_ms: u64,

    /// Bound on a single readiness attempt
    #[serde(default = "default_init_attempt_timeout_ms")]
    pub init_attempt_timeout_ms: u64,

    /// Recording allowance per issued challenge
    #[serde(default = "default_per_challenge_allowance_ms")]
    pub per_challenge_allowance_ms: u64,

    /// Extra recording time on top of the per-challenge allowance
    #[serde(default = "default_recording_grace_ms")]
    pub recording_grace_ms: u64,

    /// Bound on persistence plus submission
    #[serde(default = "default_processing_timeout_ms")]
    pub processing_timeout_ms: u64,

    /// Pause between detection cycles
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Landmark-source confidence at which a face counts as present
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
}

impl SessionConfig {
    pub fn init_backoff(&self) -> Duration {
        Duration::from_millis(self.init_backoff_ms)
    }

    pub fn init_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.init_attempt_timeout_ms)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Recording watchdog bound for a sequence of `challenges`
    pub fn recording_budget(&self, challenges: usize) -> Duration {
        Duration::from_millis(
            self.per_challenge_allowance_ms * challenges as u64 + self.recording_grace_ms,
        )
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_max_attempts: default_init_max_attempts(),
            init_backoff_ms: default_init_backoff_ms(),
            init_attempt_timeout_ms: default_init_attempt_timeout_ms(),
            per_challenge_allowance_ms: default_per_challenge_allowance_ms(),
            recording_grace_ms: default_recording_grace_ms(),
            processing_timeout_ms: default_processing_timeout_ms(),
            sample_interval_ms: default_sample_interval_ms(),
            presence_threshold: default_presence_threshold(),
        }
    }
}

/// Gesture validation thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Confidence at which a challenge completes
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f32,

    /// Yaw displacement (face widths) that saturates head-turn confidence
    #[serde(default = "default_head_turn_saturation")]
    pub head_turn_saturation: f32,

    /// Pitch travel (face heights) that saturates each half of a nod
    #[serde(default = "default_head_nod_saturation")]
    pub head_nod_saturation: f32,

    /// Corner lift (mouth widths) that saturates smile confidence
    #[serde(default = "default_smile_saturation")]
    pub smile_saturation: f32,

    /// Eye aspect ratio below which the eyes count as closed
    #[serde(default = "default_eye_closed_threshold")]
    pub eye_closed_threshold: f32,

    /// Closed frames needed before a reopen counts as a blink
    #[serde(default = "default_min_closed_frames")]
    pub min_closed_frames: u32,

    /// Frames averaged into a neutral baseline when none was seeded
    #[serde(default = "default_calibration_frames")]
    pub calibration_frames: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            head_turn_saturation: default_head_turn_saturation(),
            head_nod_saturation: default_head_nod_saturation(),
            smile_saturation: default_smile_saturation(),
            eye_closed_threshold: default_eye_closed_threshold(),
            min_closed_frames: default_min_closed_frames(),
            calibration_frames: default_calibration_frames(),
        }
    }
}

/// Challenge sequence shape
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default = "default_min_count")]
    pub min_count: usize,

    #[serde(default = "default_max_count")]
    pub max_count: usize,

    /// Blinks requested by a blink challenge
    #[serde(default = "default_blink_repeat_count")]
    pub blink_repeat_count: u8,

    /// Fixed sequence for rehearsals against a recorded trace
    #[serde(default)]
    pub sequence: Option<Vec<Gesture>>,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
            max_count: default_max_count(),
            blink_repeat_count: default_blink_repeat_count(),
            sequence: None,
        }
    }
}

/// Evidence store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Disk,
    Redis,
}

/// Evidence persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// Directory for the disk backend
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Redis connection URL for the redis backend
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Artifacts older than this are swept when a session starts
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Delete the artifact once the endpoint accepts it
    #[serde(default = "default_true")]
    pub delete_after_ack: bool,
}

impl StoreConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
            redis_url: default_redis_url(),
            retention_secs: default_retention_secs(),
            delete_after_ack: true,
        }
    }
}

/// Verification endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// Evidence intake URL
    #[serde(default = "default_submit_endpoint")]
    pub endpoint: String,

    /// Identity the evidence is submitted for
    #[serde(default)]
    pub user_id: String,

    /// Bound on each HTTP request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Pause between verdict polls when the endpoint answers 202
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_submit_endpoint(),
            user_id: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_init_max_attempts() -> u32 { DETECTOR_MAX_ATTEMPTS }
fn default_init_backoff_ms() -> u64 { DETECTOR_BACKOFF_MS }
fn default_init_attempt_timeout_ms() -> u64 { DETECTOR_ATTEMPT_TIMEOUT_MS }
fn default_per_challenge_allowance_ms() -> u64 { PER_CHALLENGE_ALLOWANCE_MS }
fn default_recording_grace_ms() -> u64 { RECORDING_GRACE_MS }
fn default_processing_timeout_ms() -> u64 { PROCESSING_TIMEOUT_MS }
fn default_sample_interval_ms() -> u64 { SAMPLE_INTERVAL_MS }
fn default_presence_threshold() -> f32 { PRESENCE_THRESHOLD }
fn default_pass_threshold() -> f32 { PASS_THRESHOLD }
fn default_head_turn_saturation() -> f32 { 0.15 }
fn default_head_nod_saturation() -> f32 { 0.08 }
fn default_smile_saturation() -> f32 { 0.12 }
fn default_eye_closed_threshold() -> f32 { 0.2 }
fn default_min_closed_frames() -> u32 { 1 }
fn default_calibration_frames() -> usize { 3 }
fn default_min_count() -> usize { MIN_CHALLENGES }
fn default_max_count() -> usize { MAX_CHALLENGES }
fn default_blink_repeat_count() -> u8 { DEFAULT_BLINK_COUNT }
fn default_store_backend() -> StoreBackend { StoreBackend::Disk }
fn default_store_path() -> String { "data/evidence".to_string() }
fn default_retention_secs() -> u64 { EVIDENCE_RETENTION_SECS }
fn default_true() -> bool { true }
fn default_submit_endpoint() -> String { "http://127.0.0.1:8080/api/liveness/evidence".to_string() }
fn default_request_timeout_ms() -> u64 { 20_000 }
fn default_poll_interval_ms() -> u64 { 2_000 }

/// Values from the command line / environment that win over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen_addr: Option<String>,
    pub redis_url: Option<String>,
    pub submit_url: Option<String>,
    pub user_id: Option<String>,
    pub trace_path: Option<String>,
}

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref listen) = overrides.listen_addr {
            config.listen_addr = listen.clone();
        }
        if let Some(ref redis_url) = overrides.redis_url {
            config.store.redis_url = redis_url.clone();
        }
        if let Some(ref submit_url) = overrides.submit_url {
            config.submission.endpoint = submit_url.clone();
        }
        if let Some(ref user_id) = overrides.user_id {
            config.submission.user_id = user_id.clone();
        }
        if let Some(ref trace) = overrides.trace_path {
            config.trace_path = Some(trace.clone());
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the state machine cannot honor
    pub fn validate(&self) -> Result<()> {
        let c = &self.challenges;
        if c.min_count == 0 || c.min_count > c.max_count || c.max_count > MAX_CHALLENGES {
            anyhow::bail!(
                "challenges: need 1 <= min_count <= max_count <= {} (got {}..={})",
                MAX_CHALLENGES,
                c.min_count,
                c.max_count
            );
        }
        if let Some(sequence) = &c.sequence {
            if sequence.is_empty() || sequence.len() > MAX_CHALLENGES {
                anyhow::bail!("challenges.sequence must hold 1..={} gestures", MAX_CHALLENGES);
            }
            if sequence.windows(2).any(|w| w[0].family() == w[1].family()) {
                anyhow::bail!("challenges.sequence repeats a gesture family back to back");
            }
        }
        if c.blink_repeat_count == 0 {
            anyhow::bail!("challenges.blink_repeat_count must be at least 1");
        }
        if self.session.init_max_attempts == 0 {
            anyhow::bail!("session.init_max_attempts must be at least 1");
        }
        let v = &self.validator;
        if !(0.0..=1.0).contains(&v.pass_threshold) || v.pass_threshold == 0.0 {
            anyhow::bail!("validator.pass_threshold must be in (0, 1]");
        }
        if v.head_turn_saturation <= 0.0 || v.head_nod_saturation <= 0.0 || v.smile_saturation <= 0.0 {
            anyhow::bail!("validator saturation points must be positive");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            trace_path: None,
            session: SessionConfig::default(),
            validator: ValidatorConfig::default(),
            challenges: ChallengeConfig::default(),
            store: StoreConfig::default(),
            submission: SubmissionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_session_bounds() {
        let config = AppConfig::default();
        assert_eq!(config.session.init_max_attempts, 3);
        assert_eq!(config.session.init_backoff(), Duration::from_secs(2));
        assert_eq!(config.session.init_attempt_timeout(), Duration::from_secs(15));
        assert_eq!(config.session.processing_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_recording_budget_scales_with_challenges() {
        let session = SessionConfig::default();
        assert_eq!(session.recording_budget(2), Duration::from_millis(13_000));
        assert_eq!(session.recording_budget(4), Duration::from_millis(23_000));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "listen_addr = \"127.0.0.1:9999\"\n[store]\nbackend = \"memory\"\n[validator]\npass_threshold = 0.9\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.store.delete_after_ack);
        assert_eq!(config.validator.pass_threshold, 0.9);
        assert_eq!(config.validator.calibration_frames, 3);
        assert_eq!(config.challenges.max_count, 4);
    }

    #[test]
    fn test_missing_file_uses_overrides() {
        let overrides = ConfigOverrides {
            listen_addr: Some("127.0.0.1:1".to_string()),
            user_id: Some("user-42".to_string()),
            ..Default::default()
        };
        let config = AppConfig::load("does/not/exist.toml", &overrides).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:1");
        assert_eq!(config.submission.user_id, "user-42");
    }

    #[test]
    fn test_fixed_sequence_from_toml() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[challenges]\nsequence = [{ type = \"blink\", repeat_count = 2 }, { type = \"smile\" }]\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: AppConfig = settings.try_deserialize().unwrap();

        assert_eq!(
            config.challenges.sequence,
            Some(vec![Gesture::Blink { repeat_count: 2 }, Gesture::Smile])
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_back_to_back_family() {
        let mut config = AppConfig::default();
        config.challenges.sequence = Some(vec![Gesture::Smile, Gesture::Smile]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_impossible_challenge_counts() {
        let mut config = AppConfig::default();
        config.challenges.max_count = 5;
        assert!(config.validate().is_err());

        config.challenges.max_count = 2;
        config.challenges.min_count = 3;
        assert!(config.validate().is_err());
    }
}
