//! Video chunk accumulator.
//!
//! Starts and stops only on the session's recording edges and never looks
//! at challenge state.

use chrono::{DateTime, Utc};

/// A finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub bytes: Vec<u8>,
    pub chunks: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Continuous byte-chunk accumulator
#[derive(Debug, Default)]
pub struct Recorder {
    buffer: Vec<u8>,
    chunks: usize,
    started_at: Option<DateTime<Utc>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.started_at.is_some()
    }

    /// Begin accumulating. Returns false if already recording.
    pub fn start(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_recording() {
            return false;
        }
        self.buffer.clear();
        self.chunks = 0;
        self.started_at = Some(at);
        tracing::debug!(started_at = %at, "Recorder started");
        true
    }

    /// Append one encoded chunk. Ignored unless recording.
    pub fn append(&mut self, chunk: &[u8]) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.buffer.extend_from_slice(chunk);
        self.chunks += 1;
        true
    }

    /// Stop and hand back everything captured since `start`
    pub fn stop(&mut self, at: DateTime<Utc>) -> Option<Recording> {
        let started_at = self.started_at.take()?;
        let recording = Recording {
            bytes: std::mem::take(&mut self.buffer),
            chunks: std::mem::replace(&mut self.chunks, 0),
            started_at,
            ended_at: at.max(started_at),
        };
        tracing::debug!(
            chunks = recording.chunks,
            bytes = recording.bytes.len(),
            "Recorder stopped"
        );
        Some(recording)
    }

    /// Stop without keeping anything
    pub fn discard(&mut self) {
        if self.started_at.take().is_some() {
            tracing::debug!(chunks = self.chunks, "Recording discarded");
        }
        self.buffer.clear();
        self.chunks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_chunks_outside_interval_are_ignored() {
        let mut recorder = Recorder::new();
        let t0 = Utc::now();

        assert!(!recorder.append(b"before"));
        assert!(recorder.start(t0));
        assert!(recorder.append(b"ab"));
        assert!(recorder.append(b"cd"));

        let recording = recorder.stop(t0 + Duration::milliseconds(40)).unwrap();
        assert_eq!(recording.bytes, b"abcd");
        assert_eq!(recording.chunks, 2);
        assert_eq!(recording.started_at, t0);
        assert_eq!(recording.ended_at, t0 + Duration::milliseconds(40));

        assert!(!recorder.append(b"after"));
        assert!(recorder.stop(Utc::now()).is_none());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let mut recorder = Recorder::new();
        assert!(recorder.start(Utc::now()));
        recorder.append(b"x");
        assert!(!recorder.start(Utc::now()));
        assert_eq!(recorder.stop(Utc::now()).unwrap().bytes, b"x");
    }

    #[test]
    fn test_discard_drops_buffer() {
        let mut recorder = Recorder::new();
        recorder.start(Utc::now());
        recorder.append(b"secret");
        recorder.discard();

        assert!(!recorder.is_recording());
        assert!(recorder.stop(Utc::now()).is_none());
    }
}
