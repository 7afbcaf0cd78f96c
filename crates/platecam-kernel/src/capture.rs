//! Snapshot production: encoding a live frame, and the file-upload path.
//!
//! Both paths end in the same place: a JPEG-encoded [`Snapshot`] that the
//! downstream analysis consumer can decode.  Neither path touches the
//! controller's session state.

use std::fs;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use platecam_hal::RawFrame;
use platecam_types::{CameraError, Snapshot, SnapshotSource};
use tracing::debug;

/// Encode an RGB raster as JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality).encode_image(image)?;
    Ok(encoded)
}

/// Turn the current live frame into a [`Snapshot`].
///
/// The raster is sized exactly to the frame's dimensions.
///
/// # Errors
///
/// Returns [`CameraError::CaptureFailed`] for a zero-dimension frame, a pixel
/// buffer whose length does not match the dimensions, or an encoder failure.
pub fn snapshot_from_frame(frame: RawFrame, quality: u8) -> Result<Snapshot, CameraError> {
    if !frame.is_displayable() {
        return Err(CameraError::CaptureFailed(format!(
            "zero-dimension frame ({}x{})",
            frame.width, frame.height
        )));
    }
    let RawFrame {
        width,
        height,
        data,
    } = frame;
    let len = data.len();
    let raster = RgbImage::from_raw(width, height, data).ok_or_else(|| {
        let expected = RawFrame::byte_len(width, height)
            .map_or_else(|| "more than usize::MAX".to_string(), |n| n.to_string());
        CameraError::CaptureFailed(format!(
            "frame buffer holds {len} bytes, expected {expected} for {width}x{height} RGB"
        ))
    })?;
    let encoded = encode_jpeg(&raster, quality)
        .map_err(|e| CameraError::CaptureFailed(format!("JPEG encoding failed: {e}")))?;
    Snapshot::new(SnapshotSource::Camera, width, height, encoded)
}

/// Build a [`Snapshot`] from the bytes of an image file chosen by the user.
///
/// JPEG input is passed through unchanged; any other supported format is
/// decoded and re-encoded as JPEG at `quality`.
///
/// # Errors
///
/// Returns [`CameraError::Upload`] when the bytes are empty, not a
/// recognised image, fail to decode, or decode to a zero-sized image.
pub fn snapshot_from_upload(
    file_name: &str,
    bytes: &[u8],
    quality: u8,
) -> Result<Snapshot, CameraError> {
    if bytes.is_empty() {
        return Err(CameraError::Upload(format!("{file_name}: file is empty")));
    }
    let format = image::guess_format(bytes).map_err(|e| {
        CameraError::Upload(format!("{file_name}: unrecognised image format ({e})"))
    })?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| CameraError::Upload(format!("{file_name}: {e}")))?;
    let (width, height) = (decoded.width(), decoded.height());

    let encoded = if format == ImageFormat::Jpeg {
        bytes.to_vec()
    } else {
        debug!(file_name, ?format, "re-encoding upload as JPEG");
        encode_jpeg(&decoded.to_rgb8(), quality)
            .map_err(|e| CameraError::Upload(format!("{file_name}: JPEG encoding failed: {e}")))?
    };

    let source = SnapshotSource::Upload {
        file_name: file_name.to_string(),
    };
    Snapshot::new(source, width, height, encoded)
        .map_err(|e| CameraError::Upload(format!("{file_name}: {e}")))
}

/// Read `path` and hand its bytes to [`snapshot_from_upload`].
///
/// # Errors
///
/// Returns [`CameraError::Upload`] if the file cannot be read or is not a
/// usable image.
pub fn snapshot_from_path(path: &Path, quality: u8) -> Result<Snapshot, CameraError> {
    let bytes = fs::read(path)
        .map_err(|e| CameraError::Upload(format!("failed to read {}: {e}", path.display())))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    snapshot_from_upload(&file_name, &bytes, quality)
}
