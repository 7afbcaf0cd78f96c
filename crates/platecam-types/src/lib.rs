use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifies one acquisition attempt. A fresh id is issued every time the
/// caller asks for a new device stream; asynchronous signals carry the id of
/// the attempt they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AttemptId(pub u64);

impl AttemptId {
    /// The id that follows `self`.
    pub fn next(self) -> Self {
        AttemptId(self.0 + 1)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// No device is held.
    #[default]
    Idle,
    /// A stream has been requested; waiting for the grant and the first
    /// displayable frame.
    Requesting,
    /// Live frames with nonzero dimensions are being produced.
    Streaming,
    /// The user or OS refused camera access.
    Denied,
    /// Acquisition or the live stream failed.
    Errored,
}

impl CaptureState {
    /// `true` for states that only an explicit retry can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, CaptureState::Denied | CaptureState::Errored)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaptureState::Idle => "idle",
            CaptureState::Requesting => "requesting",
            CaptureState::Streaming => "streaming",
            CaptureState::Denied => "denied",
            CaptureState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Zoom range reported by the device together with the current level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomState {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub current: f64,
}

impl ZoomState {
    /// Clamp `value` into `[min, max]`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Optional device features discovered once the stream is live.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_flash: bool,
    pub flash_on: bool,
    pub zoom: Option<ZoomState>,
}

/// Where a [`Snapshot`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Grabbed from the live camera stream.
    Camera,
    /// Read from an existing image file.
    Upload { file_name: String },
}

/// An encoded still image ready for downstream analysis.
///
/// A snapshot owns no device resources and stays valid after the capture
/// session that produced it has been torn down.
///
/// Serializes as metadata only.  It cannot be deserialized, since the
/// metadata alone would yield a snapshot without an image:
///
/// ```compile_fail
/// let snap: platecam_types::Snapshot = serde_json::from_str("{}").unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub source: SnapshotSource,
    pub width: u32,
    pub height: u32,
    /// JPEG-encoded image bytes.
    #[serde(skip_serializing)]
    pub encoded_image: Vec<u8>,
}

impl Snapshot {
    /// Wrap an encoded image.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::CaptureFailed`] when either dimension is zero or
    /// the buffer is empty; a degenerate image is never a valid snapshot.
    pub fn new(
        source: SnapshotSource,
        width: u32,
        height: u32,
        encoded_image: Vec<u8>,
    ) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::CaptureFailed(format!(
                "zero-dimension frame ({width}x{height})"
            )));
        }
        if encoded_image.is_empty() {
            return Err(CameraError::CaptureFailed(
                "encoder produced an empty image".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            captured_at: Utc::now(),
            source,
            width,
            height,
            encoded_image,
        })
    }

    /// Render the image as a `data:image/jpeg;base64,...` URL.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            BASE64_STANDARD.encode(&self.encoded_image)
        )
    }
}

/// Failures surfaced by the capture controller. Every variant carries a
/// human-readable reason.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera device error: {0}")]
    DeviceError(String),

    #[error("Camera did not produce a frame within {waited_ms} ms")]
    ReadinessTimeout { waited_ms: u64 },

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Capability not supported: {0}")]
    CapabilityUnsupported(String),

    #[error("Could not apply camera setting: {0}")]
    CapabilityApplyFailed(String),

    #[error("Cannot {command} while {state}")]
    InvalidTransition { state: CaptureState, command: String },

    #[error("Upload failed: {0}")]
    Upload(String),
}

impl CameraError {
    /// `true` for acquisition-phase failures, which end the session and
    /// require an explicit retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied(_)
                | CameraError::DeviceError(_)
                | CameraError::ReadinessTimeout { .. }
        )
    }
}
