//! Flash / zoom capability negotiation.
//!
//! Support for torch and zoom varies by device.  [`negotiate`] turns the raw
//! track report into the session's [`Capabilities`] record; absence of a
//! feature is represented as `None`/`false`, never as an error.

use platecam_hal::{TrackCapabilities, ZoomRange};
use platecam_types::{Capabilities, ZoomState};
use tracing::warn;

/// Zoom level assumed when the device does not report one.
pub const DEFAULT_ZOOM: f64 = 1.0;

/// Build the session capability record from a track report.
///
/// Returns `None` when the device supports neither flash nor zoom.  A zoom
/// range that is empty or non-finite is ignored.
pub fn negotiate(report: &TrackCapabilities) -> Option<Capabilities> {
    let zoom = report.zoom.and_then(|range| zoom_state(range, report.zoom_current));
    if !report.torch && zoom.is_none() {
        return None;
    }
    Some(Capabilities {
        has_flash: report.torch,
        flash_on: report.torch && report.torch_on.unwrap_or(false),
        zoom,
    })
}

fn zoom_state(range: ZoomRange, current: Option<f64>) -> Option<ZoomState> {
    let valid = range.min.is_finite()
        && range.max.is_finite()
        && range.step.is_finite()
        && range.min <= range.max;
    if !valid {
        warn!(?range, "device reported an unusable zoom range; zoom disabled");
        return None;
    }
    let current = current
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_ZOOM)
        .clamp(range.min, range.max);
    Some(ZoomState {
        min: range.min,
        max: range.max,
        step: range.step,
        current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_features_means_no_capabilities() {
        assert!(negotiate(&TrackCapabilities::default()).is_none());
    }

    #[test]
    fn torch_only() {
        let caps = negotiate(&TrackCapabilities {
            torch: true,
            torch_on: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert!(caps.has_flash);
        assert!(caps.flash_on);
        assert!(caps.zoom.is_none());
    }

    #[test]
    fn torch_state_defaults_to_off() {
        let caps = negotiate(&TrackCapabilities {
            torch: true,
            ..Default::default()
        })
        .unwrap();
        assert!(!caps.flash_on);
    }

    #[test]
    fn zoom_seeded_from_current_setting() {
        let caps = negotiate(&TrackCapabilities {
            zoom: Some(ZoomRange {
                min: 1.0,
                max: 8.0,
                step: 0.1,
            }),
            zoom_current: Some(2.5),
            ..Default::default()
        })
        .unwrap();
        assert!(!caps.has_flash);
        let zoom = caps.zoom.unwrap();
        assert!((zoom.current - 2.5).abs() < f64::EPSILON);
        assert!((zoom.max - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unreported_zoom_defaults_to_one() {
        let caps = negotiate(&TrackCapabilities {
            zoom: Some(ZoomRange {
                min: 0.5,
                max: 4.0,
                step: 0.5,
            }),
            ..Default::default()
        })
        .unwrap();
        assert!((caps.zoom.unwrap().current - DEFAULT_ZOOM).abs() < f64::EPSILON);
    }

    #[test]
    fn default_zoom_is_clamped_into_range() {
        let caps = negotiate(&TrackCapabilities {
            zoom: Some(ZoomRange {
                min: 2.0,
                max: 4.0,
                step: 1.0,
            }),
            ..Default::default()
        })
        .unwrap();
        assert!((caps.zoom.unwrap().current - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn inverted_zoom_range_is_ignored() {
        let report = TrackCapabilities {
            zoom: Some(ZoomRange {
                min: 5.0,
                max: 1.0,
                step: 1.0,
            }),
            ..Default::default()
        };
        assert!(negotiate(&report).is_none());

        let report = TrackCapabilities {
            torch: true,
            zoom: Some(ZoomRange {
                min: f64::NAN,
                max: 1.0,
                step: 1.0,
            }),
            ..Default::default()
        };
        let caps = negotiate(&report).unwrap();
        assert!(caps.has_flash);
        assert!(caps.zoom.is_none());
    }
}
