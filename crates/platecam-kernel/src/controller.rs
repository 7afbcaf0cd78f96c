//! [`CaptureController`] – camera acquisition & capture state machine.
//!
//! The controller owns at most one capture session at a time and drives it
//! through
//!
//! ```text
//!  Idle ──enter──▶ Requesting ──grant + frame(w>0,h>0)──▶ Streaming
//!                    │                                        │
//!                    ├─denied──────▶ Denied                   │ exit / drop
//!                    └─error/timeout▶ Errored ◀──device error─┤
//!                                      │                      ▼
//!       Denied / Errored ──retry──▶ Requesting              Idle
//! ```
//!
//! # Signals
//!
//! Raw platform events are normalised into three [`Signal`]s and fed into a
//! single transition function, [`CaptureController::handle`].  Every signal
//! carries the [`AttemptId`] of the acquisition it belongs to; signals from a
//! superseded attempt are discarded, and a stream granted to an abandoned
//! attempt is released on arrival.
//!
//! # Teardown
//!
//! Every path that leaves `Requesting` or `Streaming` (explicit exit, device
//! error, readiness timeout, drop) goes through the same release procedure:
//! cancel the readiness timer, stop the video track, stop the stream, detach
//! the preview sink, clear capabilities.

use std::time::{Duration, Instant};

use platecam_hal::{Constraint, MediaDeviceGateway, RawFrame, StreamHandle, TrackHandle};
use platecam_types::{AttemptId, CameraError, Capabilities, CaptureState, Snapshot};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::capabilities;
use crate::capture;
use crate::config::ControllerConfig;
use crate::notice::{Notice, NoticeBus};
use crate::readiness::ReadinessTimer;

// ────────────────────────────────────────────────────────────────────────────
// Signals
// ────────────────────────────────────────────────────────────────────────────

/// Why an acquisition was not granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireFailure {
    /// The user or OS refused access.
    Denied(String),
    /// The device could not be opened.
    Device(String),
}

/// A normalised platform event.
#[derive(Debug)]
pub enum Signal {
    /// The permission prompt (or device open) resolved.
    PermissionResolved(Result<StreamHandle, AcquireFailure>),
    /// The preview sink rendered a frame of the given size.
    FrameReported { width: u32, height: u32 },
    /// The stream failed (disconnected, driver fault, ...).
    DeviceErrored(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

struct Session {
    stream: StreamHandle,
    track: TrackHandle,
    sink_attached: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// CaptureController
// ────────────────────────────────────────────────────────────────────────────

/// Owns the lifecycle of one camera device on behalf of a single view.
///
/// # Example
///
/// ```
/// use platecam_hal::SimGateway;
/// use platecam_kernel::{CaptureController, ControllerConfig, Signal};
/// use platecam_types::CaptureState;
///
/// let mut ctl = CaptureController::new(SimGateway::new().with_torch(), ControllerConfig::default());
/// let attempt = ctl.enter().unwrap();
///
/// let stream = ctl.gateway_mut().grant(attempt).unwrap();
/// ctl.handle(attempt, Signal::PermissionResolved(Ok(stream)));
/// ctl.gateway_mut().set_frame_size(1280, 720);
/// ctl.handle(attempt, Signal::FrameReported { width: 1280, height: 720 });
/// assert_eq!(ctl.state(), CaptureState::Streaming);
///
/// let snap = ctl.capture().unwrap();
/// assert_eq!((snap.width, snap.height), (1280, 720));
///
/// ctl.exit();
/// assert_eq!(ctl.state(), CaptureState::Idle);
/// assert_eq!(ctl.gateway().live_streams(), 0);
/// ```
pub struct CaptureController<G: MediaDeviceGateway> {
    gateway: G,
    config: ControllerConfig,
    state: CaptureState,
    attempt: AttemptId,
    session: Option<Session>,
    capabilities: Option<Capabilities>,
    last_error: Option<CameraError>,
    frame_size: (u32, u32),
    timer: ReadinessTimer,
    notices: NoticeBus,
}

impl<G: MediaDeviceGateway> CaptureController<G> {
    pub fn new(gateway: G, config: ControllerConfig) -> Self {
        let timer = ReadinessTimer::new(config.readiness_timeout());
        Self {
            gateway,
            config,
            state: CaptureState::Idle,
            attempt: AttemptId::default(),
            session: None,
            capabilities: None,
            last_error: None,
            frame_size: (0, 0),
            timer,
            notices: NoticeBus::default(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Id of the most recent acquisition attempt.
    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// Reason for the most recent acquisition failure.  Cleared by every new
    /// attempt.
    pub fn last_error(&self) -> Option<&CameraError> {
        self.last_error.as_ref()
    }

    /// Size of the most recently reported frame.
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Time left for the first displayable frame, or `None` when no
    /// readiness wait is running.
    pub fn readiness_remaining(&self, now: Instant) -> Option<Duration> {
        self.timer.remaining(now)
    }

    /// `true` while a device stream is held.
    pub fn holds_stream(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Subscribe to state changes and non-fatal warnings.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Enter camera mode: release anything still held, then request a fresh
    /// stream under a new attempt id.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::DeviceError`] when the gateway cannot issue the
    /// request; the session is then `Errored`.
    pub fn enter(&mut self) -> Result<AttemptId, CameraError> {
        self.release();
        self.attempt = self.attempt.next();
        self.last_error = None;
        self.transition(CaptureState::Requesting);

        let request = *self.config.stream_request();
        info!(
            attempt = %self.attempt,
            facing = ?request.facing,
            width = request.ideal_width,
            height = request.ideal_height,
            "requesting camera stream"
        );
        if let Err(e) = self.gateway.request_stream(self.attempt, &request) {
            let err = CameraError::DeviceError(format!("could not request camera: {e}"));
            self.fail(err.clone());
            return Err(err);
        }
        Ok(self.attempt)
    }

    /// Retry after a denial or failure.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::InvalidTransition`] unless the session is
    /// `Denied` or `Errored`, or whatever [`enter`][Self::enter] returns.
    pub fn retry(&mut self) -> Result<AttemptId, CameraError> {
        if !self.state.is_terminal() {
            return Err(CameraError::InvalidTransition {
                state: self.state,
                command: "retry".to_string(),
            });
        }
        self.enter()
    }

    /// Exit camera mode.  Idempotent; safe in any state.
    pub fn exit(&mut self) {
        self.release();
        self.last_error = None;
        self.transition(CaptureState::Idle);
    }

    /// Feed a platform signal for `attempt` into the state machine, using the
    /// wall clock as the time it arrived.
    pub fn handle(&mut self, attempt: AttemptId, signal: Signal) {
        self.handle_at(attempt, signal, Instant::now());
    }

    /// Feed a platform signal that arrived at `now`.
    ///
    /// A grant arms the readiness bound from `now`, so callers that drive
    /// [`tick`][Self::tick] from their own clock should deliver signals here
    /// with the same clock.
    pub fn handle_at(&mut self, attempt: AttemptId, signal: Signal, now: Instant) {
        if attempt != self.attempt {
            debug!(
                stale = %attempt,
                current = %self.attempt,
                "discarding signal from superseded attempt"
            );
            if let Signal::PermissionResolved(Ok(stream)) = signal {
                self.discard_stream(stream);
            }
            return;
        }

        match signal {
            Signal::PermissionResolved(Ok(stream)) => self.on_granted(stream, now),
            Signal::PermissionResolved(Err(failure)) => {
                if self.state != CaptureState::Requesting || self.session.is_some() {
                    debug!(attempt = %attempt, ?failure, "ignoring late acquisition failure");
                    return;
                }
                let err = match failure {
                    AcquireFailure::Denied(reason) => CameraError::PermissionDenied(reason),
                    AcquireFailure::Device(reason) => CameraError::DeviceError(reason),
                };
                self.fail(err);
            }
            Signal::FrameReported { width, height } => self.on_frame(width, height),
            Signal::DeviceErrored(reason) => {
                if matches!(
                    self.state,
                    CaptureState::Requesting | CaptureState::Streaming
                ) {
                    self.fail(CameraError::DeviceError(reason));
                } else {
                    debug!(attempt = %attempt, %reason, "ignoring device error outside a session");
                }
            }
        }
    }

    /// Enforce the readiness bound.  Returns `true` if the session timed out
    /// on this call.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.state != CaptureState::Requesting || !self.timer.expired(now) {
            return false;
        }
        let waited_ms = u64::try_from(self.timer.timeout().as_millis()).unwrap_or(u64::MAX);
        self.fail(CameraError::ReadinessTimeout { waited_ms });
        true
    }

    /// Toggle the torch.  Returns the new torch state.
    ///
    /// # Errors
    ///
    /// - [`CameraError::InvalidTransition`] when not streaming.
    /// - [`CameraError::CapabilityUnsupported`] when the device has no torch.
    /// - [`CameraError::CapabilityApplyFailed`] when the device refused; the
    ///   session is unaffected.
    pub fn toggle_flash(&mut self) -> Result<bool, CameraError> {
        let track = self.streaming_track("toggle flash")?;
        let Some(caps) = self.capabilities.filter(|c| c.has_flash) else {
            debug!("flash requested on a device without torch");
            return Err(CameraError::CapabilityUnsupported("flash".to_string()));
        };
        let target = !caps.flash_on;
        if let Err(e) = self.gateway.apply_constraint(track, Constraint::Torch(target)) {
            return Err(self.report(CameraError::CapabilityApplyFailed(format!(
                "flash: {e}"
            ))));
        }
        if let Some(caps) = self.capabilities.as_mut() {
            caps.flash_on = target;
        }
        info!(flash_on = target, "flash toggled");
        Ok(target)
    }

    /// Set the zoom level, clamped into the device range.  Returns the level
    /// actually applied.
    ///
    /// # Errors
    ///
    /// - [`CameraError::InvalidTransition`] when not streaming.
    /// - [`CameraError::CapabilityUnsupported`] when the device has no zoom.
    /// - [`CameraError::CapabilityApplyFailed`] for a non-finite `value` or a
    ///   refused constraint; the session is unaffected.
    pub fn set_zoom(&mut self, value: f64) -> Result<f64, CameraError> {
        let track = self.streaming_track("set zoom")?;
        let Some(zoom) = self.capabilities.and_then(|c| c.zoom) else {
            debug!("zoom requested on a device without zoom");
            return Err(CameraError::CapabilityUnsupported("zoom".to_string()));
        };
        if !value.is_finite() {
            return Err(self.report(CameraError::CapabilityApplyFailed(format!(
                "zoom level {value} is not a finite number"
            ))));
        }
        let level = zoom.clamp(value);
        if let Err(e) = self.gateway.apply_constraint(track, Constraint::Zoom(level)) {
            return Err(self.report(CameraError::CapabilityApplyFailed(format!(
                "zoom: {e}"
            ))));
        }
        if let Some(zoom) = self.capabilities.as_mut().and_then(|c| c.zoom.as_mut()) {
            zoom.current = level;
        }
        info!(requested = value, applied = level, "zoom set");
        Ok(level)
    }

    /// Capture the current frame as a JPEG [`Snapshot`].
    ///
    /// Capture reads the live frame and does not change the session state;
    /// it may be repeated while streaming.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::CaptureFailed`] when the camera is not
    /// streaming, the current frame has a zero dimension, or the frame cannot
    /// be read or encoded.
    pub fn capture(&mut self) -> Result<Snapshot, CameraError> {
        if self.state != CaptureState::Streaming {
            return Err(self.report(CameraError::CaptureFailed(format!(
                "camera not ready ({})",
                self.state
            ))));
        }
        let (width, height) = self.frame_size;
        if width == 0 || height == 0 {
            return Err(self.report(CameraError::CaptureFailed(format!(
                "zero-dimension frame ({width}x{height})"
            ))));
        }
        let Some(track) = self.session.as_ref().map(|s| s.track) else {
            return Err(self.report(CameraError::CaptureFailed(
                "camera not ready (no stream)".to_string(),
            )));
        };
        let frame = match self.gateway.read_frame(track) {
            Ok(frame) => frame,
            Err(e) => {
                return Err(self.report(CameraError::CaptureFailed(format!(
                    "could not read frame: {e}"
                ))));
            }
        };
        match capture::snapshot_from_frame(frame, self.config.jpeg_quality()) {
            Ok(snapshot) => {
                info!(
                    width = snapshot.width,
                    height = snapshot.height,
                    bytes = snapshot.encoded_image.len(),
                    "snapshot captured"
                );
                Ok(snapshot)
            }
            Err(e) => Err(self.report(e)),
        }
    }

    // ------------------------------------------------------------------
    // Transition helpers
    // ------------------------------------------------------------------

    fn on_granted(&mut self, stream: StreamHandle, now: Instant) {
        if self.state != CaptureState::Requesting || self.session.is_some() {
            debug!(attempt = %self.attempt, state = %self.state, "releasing stream granted to an abandoned attempt");
            self.discard_stream(stream);
            return;
        }
        let Some(track) = stream.video_track() else {
            self.discard_stream(stream);
            self.fail(CameraError::DeviceError(
                "granted stream has no video track".to_string(),
            ));
            return;
        };

        let attached = self.gateway.attach_sink(&stream);
        self.session = Some(Session {
            stream,
            track,
            sink_attached: attached.is_ok(),
        });
        if let Err(e) = attached {
            self.fail(CameraError::DeviceError(format!(
                "could not attach preview: {e}"
            )));
            return;
        }

        self.timer.arm(now);
        info!(
            attempt = %self.attempt,
            timeout_ms = u64::try_from(self.timer.timeout().as_millis()).unwrap_or(u64::MAX),
            "camera permission granted; waiting for first frame"
        );
    }

    fn on_frame(&mut self, width: u32, height: u32) {
        if self.session.is_none() {
            debug!(width, height, "ignoring frame report without a stream");
            return;
        }
        self.frame_size = (width, height);
        match self.state {
            CaptureState::Requesting if RawFrame::displayable(width, height) => {
                self.timer.cancel();
                self.transition(CaptureState::Streaming);
                self.negotiate_capabilities();
            }
            CaptureState::Requesting => {
                debug!(width, height, "frame not displayable yet; still waiting");
            }
            _ => {}
        }
    }

    fn negotiate_capabilities(&mut self) {
        let Some(track) = self.session.as_ref().map(|s| s.track) else {
            return;
        };
        self.capabilities = match self.gateway.query_capabilities(track) {
            Ok(report) => capabilities::negotiate(&report),
            Err(e) => {
                warn!(error = %e, "capability query failed; flash and zoom unavailable");
                None
            }
        };
        debug!(capabilities = ?self.capabilities, "capabilities negotiated");
    }

    fn streaming_track(&self, command: &str) -> Result<TrackHandle, CameraError> {
        match (&self.session, self.state) {
            (Some(session), CaptureState::Streaming) => Ok(session.track),
            _ => Err(CameraError::InvalidTransition {
                state: self.state,
                command: command.to_string(),
            }),
        }
    }

    /// Release every held resource, in order.  Does not change `state`.
    fn release(&mut self) {
        self.timer.cancel();
        if let Some(session) = self.session.take() {
            self.gateway.stop_track(session.track);
            let stream_id = session.stream.id();
            self.gateway.stop_stream(session.stream);
            if session.sink_attached {
                self.gateway.detach_sink();
            }
            info!(attempt = %self.attempt, stream = stream_id, "camera stream released");
        }
        self.capabilities = None;
        self.frame_size = (0, 0);
    }

    /// Release a stream that never became (or no longer is) the session's.
    fn discard_stream(&mut self, stream: StreamHandle) {
        if let Some(track) = stream.video_track() {
            self.gateway.stop_track(track);
        }
        self.gateway.stop_stream(stream);
    }

    fn fail(&mut self, err: CameraError) {
        self.release();
        warn!(attempt = %self.attempt, error = %err, "camera session failed");
        let to = match err {
            CameraError::PermissionDenied(_) => CaptureState::Denied,
            _ => CaptureState::Errored,
        };
        self.last_error = Some(err);
        self.transition(to);
    }

    /// Report a non-fatal failure and hand it back to the caller.
    fn report(&self, err: CameraError) -> CameraError {
        warn!(error = %err, "camera operation failed");
        self.notices.publish(Notice::Warning(err.clone()));
        err
    }

    fn transition(&mut self, to: CaptureState) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.state = to;
        info!(attempt = %self.attempt, %from, %to, "capture state changed");
        self.notices.publish(Notice::StateChanged {
            attempt: self.attempt,
            from,
            to,
        });
    }
}

impl<G: MediaDeviceGateway> Drop for CaptureController<G> {
    fn drop(&mut self) {
        self.release();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
