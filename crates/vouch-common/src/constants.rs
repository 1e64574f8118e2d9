//! Shared constants for Vouch components.

/// Default loopback HTTP listen address for the kiosk daemon
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Default Redis connection URL (only used by the redis evidence backend)
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Validator confidence at which a challenge locks in as completed
pub const PASS_THRESHOLD: f32 = 0.8;

/// Landmark-source confidence at which a face counts as present
pub const PRESENCE_THRESHOLD: f32 = 0.5;

/// Fewest challenges issued per session
pub const MIN_CHALLENGES: usize = 2;

/// Most challenges issued per session (one per gesture family)
pub const MAX_CHALLENGES: usize = 4;

/// Blinks requested by a blink challenge
pub const DEFAULT_BLINK_COUNT: u8 = 2;

/// Landmark-source readiness attempts before giving up
pub const DETECTOR_MAX_ATTEMPTS: u32 = 3;

/// Wait between landmark-source readiness attempts (2 seconds)
pub const DETECTOR_BACKOFF_MS: u64 = 2_000;

/// Per-attempt readiness bound (15 seconds)
pub const DETECTOR_ATTEMPT_TIMEOUT_MS: u64 = 15_000;

/// Recording allowance per issued challenge (5 seconds)
pub const PER_CHALLENGE_ALLOWANCE_MS: u64 = 5_000;

/// Grace added on top of the per-challenge allowance (3 seconds)
pub const RECORDING_GRACE_MS: u64 = 3_000;

/// Bound on persistence plus submission (60 seconds)
pub const PROCESSING_TIMEOUT_MS: u64 = 60_000;

/// Pause between detection cycles (~30 fps)
pub const SAMPLE_INTERVAL_MS: u64 = 33;

/// Evidence retention before the start-of-session sweep removes it (24 hours)
pub const EVIDENCE_RETENTION_SECS: u64 = 86_400;

/// Redis key prefixes
pub mod redis_keys {
    /// Evidence artifact: evidence:{session_id}
    pub const EVIDENCE_PREFIX: &str = "evidence:";

    /// Sorted set of artifact ids scored by creation time (ms)
    pub const EVIDENCE_INDEX: &str = "vouch:evidence_index";
}
