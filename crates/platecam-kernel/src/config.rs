//! [`ControllerConfig`] – tunables of the capture controller.

use std::time::Duration;

use platecam_hal::StreamRequest;

/// How long a granted stream may take to render its first displayable frame.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// JPEG quality used for snapshots unless configured otherwise.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Configuration for a [`CaptureController`][crate::controller::CaptureController].
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    readiness_timeout: Duration,
    jpeg_quality: u8,
    stream_request: StreamRequest,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stream_request: StreamRequest::default(),
        }
    }
}

impl ControllerConfig {
    /// Set the bound on the wait between permission grant and first frame.
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Set the JPEG quality.  Values are clamped to `1..=100`.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set the device selection used for every acquisition.
    pub fn with_stream_request(mut self, request: StreamRequest) -> Self {
        self.stream_request = request;
        self
    }

    pub fn readiness_timeout(&self) -> Duration {
        self.readiness_timeout
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    pub fn stream_request(&self) -> &StreamRequest {
        &self.stream_request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platecam_hal::FacingMode;

    #[test]
    fn defaults() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.readiness_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.jpeg_quality(), 90);
        assert_eq!(cfg.stream_request().facing, FacingMode::Environment);
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(ControllerConfig::default().with_jpeg_quality(0).jpeg_quality(), 1);
        assert_eq!(ControllerConfig::default().with_jpeg_quality(250).jpeg_quality(), 100);
        assert_eq!(ControllerConfig::default().with_jpeg_quality(75).jpeg_quality(), 75);
    }

    #[test]
    fn builder_overrides() {
        let request = StreamRequest {
            facing: FacingMode::User,
            ideal_width: 640,
            ideal_height: 480,
        };
        let cfg = ControllerConfig::default()
            .with_readiness_timeout(Duration::from_millis(250))
            .with_stream_request(request);
        assert_eq!(cfg.readiness_timeout(), Duration::from_millis(250));
        assert_eq!(*cfg.stream_request(), request);
    }
}
