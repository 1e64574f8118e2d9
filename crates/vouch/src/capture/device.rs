//! Exclusive ownership of an open capture device.

use vouch_common::VouchError;

use super::{CaptureStream, Frame};

/// Holds an open capture stream for one session.
///
/// Dropping the lease releases the device, so every exit path (success,
/// error, cancel, or an initialization job abandoned mid-flight) gives the
/// camera back.
pub struct DeviceLease {
    stream: Box<dyn CaptureStream>,
    released: bool,
}

impl DeviceLease {
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream,
            released: false,
        }
    }

    /// Sample the next frame
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, VouchError> {
        self.stream.next_frame().await
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        if !self.released {
            self.stream.release();
            self.released = true;
            tracing::debug!("Capture device released");
        }
    }
}

impl std::fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLease")
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCamera;
    use crate::capture::Camera;

    #[tokio::test]
    async fn test_drop_releases_device() {
        let camera = ScriptedCamera::new();
        let lease = DeviceLease::new(camera.acquire().await.unwrap());
        assert!(camera.is_open());

        drop(lease);
        assert!(!camera.is_open());
        assert_eq!(camera.release_count(), 1);
    }
}
