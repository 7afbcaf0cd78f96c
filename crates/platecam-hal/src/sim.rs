//! In-process simulated camera for tests and headless runs.
//!
//! [`SimGateway`] implements [`MediaDeviceGateway`] without any hardware.
//! Acquisitions stay pending until [`SimGateway::grant`] is called, which
//! lets tests interleave grants, denials and user actions in any order.  Every
//! device call is counted in [`SimStats`] and appended to an ordered
//! [`SimCall`] log, so resource-ownership and teardown-order properties can be
//! asserted directly.
//!
//! # Example
//!
//! ```rust
//! use platecam_hal::gateway::{MediaDeviceGateway, StreamRequest};
//! use platecam_hal::sim::SimGateway;
//! use platecam_types::AttemptId;
//!
//! let mut sim = SimGateway::new().with_torch();
//! sim.request_stream(AttemptId(1), &StreamRequest::default()).unwrap();
//! assert_eq!(sim.pending(), vec![AttemptId(1)]);
//!
//! let stream = sim.grant(AttemptId(1)).expect("pending request");
//! assert_eq!(sim.live_streams(), 1);
//! sim.stop_stream(stream);
//! assert_eq!(sim.live_streams(), 0);
//! ```

use std::collections::HashSet;

use platecam_types::AttemptId;
use tracing::debug;

use crate::gateway::{
    Constraint, GatewayError, MediaDeviceGateway, RawFrame, StreamHandle, StreamRequest,
    TrackCapabilities, TrackHandle, ZoomRange,
};

// ────────────────────────────────────────────────────────────────────────────
// Call accounting
// ────────────────────────────────────────────────────────────────────────────

/// Counts of every device call made against a [`SimGateway`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub requests: usize,
    pub grants: usize,
    pub stopped_tracks: usize,
    pub stopped_streams: usize,
    pub sink_attaches: usize,
    pub sink_detaches: usize,
    pub constraints_applied: usize,
    pub frames_read: usize,
}

/// One device call, in the order it was made.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCall {
    RequestStream(AttemptId),
    StopTrack(TrackHandle),
    StopStream(u64),
    AttachSink(u64),
    DetachSink,
    ApplyConstraint(Constraint),
    ReadFrame(TrackHandle),
}

/// Largest frame the simulated sensor renders (8K UHD).
pub const MAX_FRAME_PIXELS: u64 = 7680 * 4320;

// ────────────────────────────────────────────────────────────────────────────
// SimGateway
// ────────────────────────────────────────────────────────────────────────────

/// A simulated single-camera device.
///
/// The device is exclusive: requesting a stream while another one is still
/// live fails with [`GatewayError::Busy`].
#[derive(Debug)]
pub struct SimGateway {
    device_present: bool,
    torch: bool,
    zoom: Option<ZoomRange>,
    reject_constraints: bool,

    next_id: u64,
    pending: Vec<(AttemptId, StreamRequest)>,
    live_streams: HashSet<u64>,
    live_tracks: HashSet<u64>,
    sink: Option<u64>,

    frame_width: u32,
    frame_height: u32,
    torch_on: bool,
    zoom_level: f64,
    last_request: Option<StreamRequest>,

    stats: SimStats,
    calls: Vec<SimCall>,
}

impl Default for SimGateway {
    fn default() -> Self {
        Self {
            device_present: true,
            torch: false,
            zoom: None,
            reject_constraints: false,
            next_id: 1,
            pending: Vec::new(),
            live_streams: HashSet::new(),
            live_tracks: HashSet::new(),
            sink: None,
            frame_width: 0,
            frame_height: 0,
            torch_on: false,
            zoom_level: 1.0,
            last_request: None,
            stats: SimStats::default(),
            calls: Vec::new(),
        }
    }
}

impl SimGateway {
    /// A camera with no torch and no zoom.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a torch (flash) capability.
    pub fn with_torch(mut self) -> Self {
        self.torch = true;
        self
    }

    /// Advertise a zoom range.  The initial level is `min`.
    pub fn with_zoom(mut self, min: f64, max: f64, step: f64) -> Self {
        self.zoom = Some(ZoomRange { min, max, step });
        self.zoom_level = min;
        self
    }

    /// Refuse every constraint change, as a flaky driver would.
    pub fn failing_constraints(mut self) -> Self {
        self.reject_constraints = true;
        self
    }

    /// Simulate a machine with no camera attached.
    pub fn without_device(mut self) -> Self {
        self.device_present = false;
        self
    }

    // ------------------------------------------------------------------
    // Driving the simulation
    // ------------------------------------------------------------------

    /// Attempts whose acquisition is still awaiting a grant or denial.
    pub fn pending(&self) -> Vec<AttemptId> {
        self.pending.iter().map(|(a, _)| *a).collect()
    }

    /// Drop the pending request for `attempt` without granting it.
    ///
    /// Returns `false` if no such request was pending.
    pub fn deny(&mut self, attempt: AttemptId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(a, _)| *a != attempt);
        self.pending.len() != before
    }

    /// Grant the pending request for `attempt`, opening a new stream.
    ///
    /// Returns `None` if no request for `attempt` is pending.
    pub fn grant(&mut self, attempt: AttemptId) -> Option<StreamHandle> {
        let idx = self.pending.iter().position(|(a, _)| *a == attempt)?;
        self.pending.remove(idx);

        let id = self.next_id;
        self.next_id += 1;
        self.live_streams.insert(id);
        // Tracks share the id space of their stream.
        self.live_tracks.insert(id);
        self.stats.grants += 1;
        debug!(attempt = %attempt, stream = id, "sim stream granted");
        Some(StreamHandle::new(id, Some(TrackHandle(id))))
    }

    /// Set the size of the frame the simulated sensor currently renders.
    pub fn set_frame_size(&mut self, width: u32, height: u32) {
        self.frame_width = width;
        self.frame_height = height;
    }

    /// Kill every live stream as if the camera had been unplugged.
    pub fn unplug(&mut self) {
        self.live_streams.clear();
        self.live_tracks.clear();
        self.sink = None;
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Every device call made so far, oldest first.
    pub fn calls(&self) -> &[SimCall] {
        &self.calls
    }

    /// Drain the call log, leaving it empty.
    pub fn take_calls(&mut self) -> Vec<SimCall> {
        std::mem::take(&mut self.calls)
    }

    /// Number of streams granted and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.live_streams.len()
    }

    pub fn sink_attached(&self) -> bool {
        self.sink.is_some()
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    /// The most recent [`StreamRequest`] received.
    pub fn last_request(&self) -> Option<StreamRequest> {
        self.last_request
    }

    fn ensure_live(&self, track: TrackHandle) -> Result<(), GatewayError> {
        if self.live_tracks.contains(&track.0) {
            Ok(())
        } else {
            Err(GatewayError::Disconnected)
        }
    }

    /// Deterministic gradient so encoded snapshots are not trivially flat.
    ///
    /// Sizes beyond [`MAX_FRAME_PIXELS`] are refused instead of allocated.
    fn render(&self) -> Result<Vec<u8>, GatewayError> {
        let (width, height) = (self.frame_width, self.frame_height);
        let len = RawFrame::byte_len(width, height)
            .filter(|_| u64::from(width) * u64::from(height) <= MAX_FRAME_PIXELS)
            .ok_or_else(|| {
                GatewayError::Rejected(format!("sensor cannot render a {width}x{height} frame"))
            })?;
        let (w, h) = (width as usize, height as usize);
        let mut data = Vec::with_capacity(len);
        for y in 0..h {
            for x in 0..w {
                data.push((x * 255 / w) as u8);
                data.push((y * 255 / h) as u8);
                data.push(if self.torch_on { 255 } else { 96 });
            }
        }
        Ok(data)
    }
}

impl MediaDeviceGateway for SimGateway {
    fn request_stream(
        &mut self,
        attempt: AttemptId,
        request: &StreamRequest,
    ) -> Result<(), GatewayError> {
        self.stats.requests += 1;
        self.calls.push(SimCall::RequestStream(attempt));
        self.last_request = Some(*request);
        if !self.device_present {
            return Err(GatewayError::NoDevice);
        }
        if !self.live_streams.is_empty() {
            return Err(GatewayError::Busy);
        }
        self.pending.push((attempt, *request));
        Ok(())
    }

    fn stop_track(&mut self, track: TrackHandle) {
        self.stats.stopped_tracks += 1;
        self.calls.push(SimCall::StopTrack(track));
        self.live_tracks.remove(&track.0);
    }

    fn stop_stream(&mut self, stream: StreamHandle) {
        self.stats.stopped_streams += 1;
        self.calls.push(SimCall::StopStream(stream.id()));
        self.live_streams.remove(&stream.id());
        if let Some(track) = stream.video_track() {
            self.live_tracks.remove(&track.0);
        }
        self.torch_on = false;
    }

    fn attach_sink(&mut self, stream: &StreamHandle) -> Result<(), GatewayError> {
        self.calls.push(SimCall::AttachSink(stream.id()));
        if !self.live_streams.contains(&stream.id()) {
            return Err(GatewayError::Disconnected);
        }
        self.stats.sink_attaches += 1;
        self.sink = Some(stream.id());
        Ok(())
    }

    fn detach_sink(&mut self) {
        self.stats.sink_detaches += 1;
        self.calls.push(SimCall::DetachSink);
        self.sink = None;
    }

    fn query_capabilities(&self, track: TrackHandle) -> Result<TrackCapabilities, GatewayError> {
        self.ensure_live(track)?;
        Ok(TrackCapabilities {
            torch: self.torch,
            zoom: self.zoom,
            torch_on: self.torch.then_some(self.torch_on),
            zoom_current: self.zoom.map(|_| self.zoom_level),
        })
    }

    fn apply_constraint(
        &mut self,
        track: TrackHandle,
        constraint: Constraint,
    ) -> Result<(), GatewayError> {
        self.calls.push(SimCall::ApplyConstraint(constraint));
        self.ensure_live(track)?;
        if self.reject_constraints {
            return Err(GatewayError::Rejected(format!(
                "driver refused {constraint:?}"
            )));
        }
        match constraint {
            Constraint::Torch(on) if self.torch => self.torch_on = on,
            Constraint::Zoom(level) if self.zoom.is_some() => self.zoom_level = level,
            _ => return Err(GatewayError::Unsupported),
        }
        self.stats.constraints_applied += 1;
        Ok(())
    }

    fn read_frame(&mut self, track: TrackHandle) -> Result<RawFrame, GatewayError> {
        self.calls.push(SimCall::ReadFrame(track));
        self.ensure_live(track)?;
        self.stats.frames_read += 1;
        Ok(RawFrame {
            width: self.frame_width,
            height: self.frame_height,
            data: self.render()?,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn granted(sim: &mut SimGateway) -> StreamHandle {
        sim.request_stream(AttemptId(1), &StreamRequest::default())
            .unwrap();
        sim.grant(AttemptId(1)).unwrap()
    }

    #[test]
    fn request_then_grant_opens_stream() {
        let mut sim = SimGateway::new();
        let stream = granted(&mut sim);
        assert_eq!(sim.live_streams(), 1);
        assert!(stream.video_track().is_some());
        assert!(sim.pending().is_empty());
        assert_eq!(sim.stats().requests, 1);
        assert_eq!(sim.stats().grants, 1);
    }

    #[test]
    fn grant_without_request_is_none() {
        let mut sim = SimGateway::new();
        assert!(sim.grant(AttemptId(3)).is_none());
    }

    #[test]
    fn deny_removes_pending_request() {
        let mut sim = SimGateway::new();
        sim.request_stream(AttemptId(4), &StreamRequest::default())
            .unwrap();
        assert!(sim.deny(AttemptId(4)));
        assert!(!sim.deny(AttemptId(4)));
        assert!(sim.pending().is_empty());
    }

    #[test]
    fn missing_device_fails_request() {
        let mut sim = SimGateway::new().without_device();
        let err = sim
            .request_stream(AttemptId(1), &StreamRequest::default())
            .unwrap_err();
        assert_eq!(err, GatewayError::NoDevice);
    }

    #[test]
    fn device_is_exclusive() {
        let mut sim = SimGateway::new();
        let _stream = granted(&mut sim);
        let err = sim
            .request_stream(AttemptId(2), &StreamRequest::default())
            .unwrap_err();
        assert_eq!(err, GatewayError::Busy);
    }

    #[test]
    fn stop_stream_releases_device_and_track() {
        let mut sim = SimGateway::new();
        let stream = granted(&mut sim);
        let track = stream.video_track().unwrap();
        sim.stop_stream(stream);
        assert_eq!(sim.live_streams(), 0);
        assert_eq!(sim.read_frame(track).unwrap_err(), GatewayError::Disconnected);
    }

    #[test]
    fn sink_follows_stream() {
        let mut sim = SimGateway::new();
        let stream = granted(&mut sim);
        sim.attach_sink(&stream).unwrap();
        assert!(sim.sink_attached());
        sim.detach_sink();
        assert!(!sim.sink_attached());

        sim.unplug();
        assert_eq!(sim.attach_sink(&stream).unwrap_err(), GatewayError::Disconnected);
    }

    #[test]
    fn capabilities_reflect_builder() {
        let mut sim = SimGateway::new().with_torch().with_zoom(1.0, 5.0, 0.1);
        let track = granted(&mut sim).video_track().unwrap();
        let caps = sim.query_capabilities(track).unwrap();
        assert!(caps.torch);
        assert_eq!(caps.torch_on, Some(false));
        assert_eq!(caps.zoom.unwrap().max, 5.0);
        assert_eq!(caps.zoom_current, Some(1.0));
    }

    #[test]
    fn plain_camera_reports_no_capabilities() {
        let mut sim = SimGateway::new();
        let track = granted(&mut sim).video_track().unwrap();
        let caps = sim.query_capabilities(track).unwrap();
        assert!(!caps.torch);
        assert!(caps.zoom.is_none());
        assert_eq!(
            sim.apply_constraint(track, Constraint::Torch(true))
                .unwrap_err(),
            GatewayError::Unsupported
        );
    }

    #[test]
    fn constraints_apply_and_can_be_rejected() {
        let mut sim = SimGateway::new().with_torch().with_zoom(1.0, 3.0, 0.5);
        let track = granted(&mut sim).video_track().unwrap();
        sim.apply_constraint(track, Constraint::Torch(true)).unwrap();
        sim.apply_constraint(track, Constraint::Zoom(2.0)).unwrap();
        assert!(sim.torch_on());
        assert_eq!(sim.zoom_level(), 2.0);

        let mut flaky = SimGateway::new().with_torch().failing_constraints();
        let track = granted(&mut flaky).video_track().unwrap();
        assert!(matches!(
            flaky.apply_constraint(track, Constraint::Torch(true)),
            Err(GatewayError::Rejected(_))
        ));
        assert!(!flaky.torch_on());
    }

    #[test]
    fn frame_matches_configured_size() {
        let mut sim = SimGateway::new();
        let track = granted(&mut sim).video_track().unwrap();
        sim.set_frame_size(4, 3);
        let frame = sim.read_frame(track).unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert_eq!(frame.data.len(), 4 * 3 * 3);
    }

    #[test]
    fn oversized_frame_is_refused() {
        let mut sim = SimGateway::new();
        let track = granted(&mut sim).video_track().unwrap();

        sim.set_frame_size(u32::MAX, u32::MAX);
        assert!(matches!(sim.read_frame(track), Err(GatewayError::Rejected(_))));

        sim.set_frame_size(70_000, 70_000);
        assert!(matches!(sim.read_frame(track), Err(GatewayError::Rejected(_))));

        sim.set_frame_size(7681, 4320);
        assert!(matches!(sim.read_frame(track), Err(GatewayError::Rejected(_))));
        assert_eq!(sim.stats().frames_read, 3);
    }

    #[test]
    fn calls_are_logged_in_order() {
        let mut sim = SimGateway::new();
        let stream = granted(&mut sim);
        let track = stream.video_track().unwrap();
        sim.attach_sink(&stream).unwrap();
        sim.stop_track(track);
        sim.stop_stream(stream);
        sim.detach_sink();

        assert_eq!(
            sim.take_calls(),
            vec![
                SimCall::RequestStream(AttemptId(1)),
                SimCall::AttachSink(track.0),
                SimCall::StopTrack(track),
                SimCall::StopStream(track.0),
                SimCall::DetachSink,
            ]
        );
        assert!(sim.calls().is_empty());
    }
}
