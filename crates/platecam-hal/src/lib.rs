//! `platecam-hal` – Camera device abstraction
//!
//! # Modules
//!
//! - [`gateway`] – [`MediaDeviceGateway`][gateway::MediaDeviceGateway]: the
//!   injected capability interface through which the capture controller
//!   requests, inspects, reconfigures and releases device streams.
//! - [`sim`] – [`SimGateway`][sim::SimGateway]: an in-process simulated
//!   camera with call accounting, used by tests and the headless CLI.

pub mod gateway;
pub mod sim;

pub use gateway::{
    Constraint, FacingMode, GatewayError, MediaDeviceGateway, RawFrame, StreamHandle,
    StreamRequest, TrackCapabilities, TrackHandle, ZoomRange,
};
pub use sim::{MAX_FRAME_PIXELS, SimCall, SimGateway, SimStats};
