//! `platecam-kernel` – Camera Acquisition & Capture Controller
//!
//! Owns the lifecycle of a live camera for the purpose of producing still
//! snapshots of a meal for downstream analysis.
//!
//! # Modules
//!
//! - [`controller`] – [`CaptureController`][controller::CaptureController]:
//!   the session state machine (`Idle → Requesting → Streaming`, plus
//!   `Denied` / `Errored`), stale-attempt filtering, single teardown path, and
//!   the flash / zoom / capture commands.
//! - [`readiness`] – [`ReadinessTimer`][readiness::ReadinessTimer]: the
//!   bounded wait between permission grant and the first displayable frame.
//! - [`capabilities`] – turns a device's torch / zoom report into the
//!   session's [`Capabilities`][platecam_types::Capabilities].
//! - [`capture`] – JPEG encoding of a live frame, and the stateless
//!   file-upload path that bypasses the device entirely.
//! - [`notice`] – [`NoticeBus`][notice::NoticeBus]: one-shot notifications of
//!   state changes and non-fatal failures.
//! - [`config`] – [`ControllerConfig`][config::ControllerConfig].

pub mod capabilities;
pub mod capture;
pub mod config;
pub mod controller;
pub mod notice;
pub mod readiness;

pub use capture::{snapshot_from_path, snapshot_from_upload};
pub use config::ControllerConfig;
pub use controller::{AcquireFailure, CaptureController, Signal};
pub use notice::{Notice, NoticeBus};
pub use readiness::ReadinessTimer;
