//! Capture device access and video recording.
//!
//! The camera is acquired once per session and held through a
//! [`DeviceLease`], which hands the device back when dropped. The
//! [`Recorder`] only accumulates chunks between its start and stop edges.

mod device;
mod recorder;

pub use device::DeviceLease;
pub use recorder::{Recorder, Recording};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vouch_common::VouchError;

/// One sampled frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded chunk for this frame; also what the landmark source reads
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// A media-capture device that can be opened
#[async_trait]
pub trait Camera: Send + Sync {
    /// Open the device. Permission and availability failures are `VouchError::Camera`.
    async fn acquire(&self) -> Result<Box<dyn CaptureStream>, VouchError>;
}

/// An open capture stream
#[async_trait]
pub trait CaptureStream: Send {
    /// Next sampled frame; `None` once the device has gone away
    async fn next_frame(&mut self) -> Result<Option<Frame>, VouchError>;

    /// Stop capturing and hand the device back. Called exactly once.
    fn release(&mut self);
}
