//! [`MediaDeviceGateway`] – the capability interface between the capture
//! controller and a physical (or simulated) camera.
//!
//! The controller never touches a device API directly.  Everything it needs
//! from the platform goes through this trait, so the same state machine runs
//! against a browser media bridge, a native camera driver, or the in-process
//! [`SimGateway`][crate::sim::SimGateway].
//!
//! # Asynchronous acquisition
//!
//! [`MediaDeviceGateway::request_stream`] only *starts* an acquisition.  The
//! grant or denial arrives later (possibly after a user-mediated permission
//! prompt) and is delivered to the controller as a signal tagged with the
//! [`AttemptId`] passed here.

use platecam_types::AttemptId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Request / handle types
// ────────────────────────────────────────────────────────────────────────────

/// Which physical camera to prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, pointing away from the user.
    #[default]
    Environment,
    /// Front camera.
    User,
    /// Whatever the platform considers the default device.
    Any,
}

/// Parameters for a stream acquisition.
///
/// `facing` is a preference: gateways fall back to the default device when no
/// camera with the requested facing exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
        }
    }
}

/// Back-reference to the video track of a stream.
///
/// Used for capability queries and constraint changes only.  Stopping the
/// owning stream stops the track as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle(pub u64);

/// Exclusive ownership of a live device stream.
///
/// Not `Clone`: [`MediaDeviceGateway::stop_stream`] consumes the handle, so a
/// stream can be released at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct StreamHandle {
    id: u64,
    video_track: Option<TrackHandle>,
}

impl StreamHandle {
    /// Called by gateway implementations when a stream is granted.
    pub fn new(id: u64, video_track: Option<TrackHandle>) -> Self {
        Self { id, video_track }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The stream's video track, if it has one.
    pub fn video_track(&self) -> Option<TrackHandle> {
        self.video_track
    }
}

/// A device setting the controller may change on a live track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    Torch(bool),
    Zoom(f64),
}

/// Zoom range advertised by a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Capability metadata and current settings of a video track.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackCapabilities {
    pub torch: bool,
    pub zoom: Option<ZoomRange>,
    /// Current torch setting, when the device reports one.
    pub torch_on: Option<bool>,
    /// Current zoom level, when the device reports one.
    pub zoom_current: Option<f64>,
}

/// The current live frame as packed RGB24.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// `true` when both dimensions are nonzero.
    pub fn is_displayable(&self) -> bool {
        Self::displayable(self.width, self.height)
    }

    /// `true` when a frame of `width`×`height` can be shown.
    pub fn displayable(width: u32, height: u32) -> bool {
        width > 0 && height > 0
    }

    /// RGB24 buffer length for `width`×`height`, or `None` if it does not
    /// fit in `usize`.
    pub fn byte_len(width: u32, height: u32) -> Option<usize> {
        usize::try_from(width)
            .ok()?
            .checked_mul(usize::try_from(height).ok()?)?
            .checked_mul(3)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failures reported by a gateway implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("no camera device available")]
    NoDevice,

    #[error("camera is in use by another application")]
    Busy,

    #[error("operation not supported by this device")]
    Unsupported,

    #[error("device rejected the request: {0}")]
    Rejected(String),

    #[error("device disconnected")]
    Disconnected,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait
// ────────────────────────────────────────────────────────────────────────────

/// Platform camera access as seen by the capture controller.
pub trait MediaDeviceGateway {
    /// Begin acquiring a stream for `attempt`.
    ///
    /// Returns as soon as the request is issued.  The outcome is delivered
    /// later, out of band, tagged with `attempt`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the request cannot even be issued
    /// (e.g. [`GatewayError::NoDevice`]).
    fn request_stream(
        &mut self,
        attempt: AttemptId,
        request: &StreamRequest,
    ) -> Result<(), GatewayError>;

    /// Stop a single track.
    fn stop_track(&mut self, track: TrackHandle);

    /// Stop every track of `stream` and release the device.
    fn stop_stream(&mut self, stream: StreamHandle);

    /// Route `stream` into the preview sink.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Disconnected`] if the stream is already dead.
    fn attach_sink(&mut self, stream: &StreamHandle) -> Result<(), GatewayError>;

    /// Disconnect the preview sink from whatever stream it shows.
    fn detach_sink(&mut self);

    /// Read capability metadata and current settings of `track`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the platform cannot report them.
    fn query_capabilities(&self, track: TrackHandle) -> Result<TrackCapabilities, GatewayError>;

    /// Apply `constraint` to `track`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unsupported`] or [`GatewayError::Rejected`]
    /// when the setting cannot be applied.
    fn apply_constraint(
        &mut self,
        track: TrackHandle,
        constraint: Constraint,
    ) -> Result<(), GatewayError>;

    /// Read the frame currently rendered for `track`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Disconnected`] when the track is no longer live.
    fn read_frame(&mut self, track: TrackHandle) -> Result<RawFrame, GatewayError>;
}

impl<G: MediaDeviceGateway + ?Sized> MediaDeviceGateway for &mut G {
    fn request_stream(
        &mut self,
        attempt: AttemptId,
        request: &StreamRequest,
    ) -> Result<(), GatewayError> {
        (**self).request_stream(attempt, request)
    }

    fn stop_track(&mut self, track: TrackHandle) {
        (**self).stop_track(track)
    }

    fn stop_stream(&mut self, stream: StreamHandle) {
        (**self).stop_stream(stream)
    }

    fn attach_sink(&mut self, stream: &StreamHandle) -> Result<(), GatewayError> {
        (**self).attach_sink(stream)
    }

    fn detach_sink(&mut self) {
        (**self).detach_sink()
    }

    fn query_capabilities(&self, track: TrackHandle) -> Result<TrackCapabilities, GatewayError> {
        (**self).query_capabilities(track)
    }

    fn apply_constraint(
        &mut self,
        track: TrackHandle,
        constraint: Constraint,
    ) -> Result<(), GatewayError> {
        (**self).apply_constraint(track, constraint)
    }

    fn read_frame(&mut self, track: TrackHandle) -> Result<RawFrame, GatewayError> {
        (**self).read_frame(track)
    }
}
