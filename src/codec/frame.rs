use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};

use super::transport::to_base64;
use crate::error::CodecError;

/// MIME type of every transmitted camera frame
pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// Default JPEG quality (0.85 on a 0-1 scale)
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// A compressed camera snapshot ready for the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVideoFrame {
    /// Base64-encoded JPEG bytes
    pub data: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Un-mirror and JPEG-compress a camera snapshot
///
/// The camera preview is shown mirrored to the user, so the frame is
/// flipped along its vertical axis before encoding to restore true
/// left/right orientation.
pub fn encode_frame(frame: &RgbImage, quality: u8) -> Result<EncodedVideoFrame, CodecError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(CodecError::EmptyFrame);
    }

    let corrected = imageops::flip_horizontal(frame);

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    corrected.write_with_encoder(encoder)?;

    if jpeg.is_empty() {
        return Err(CodecError::EmptyFrame);
    }

    Ok(EncodedVideoFrame {
        data: to_base64(&jpeg),
        mime_type: JPEG_MIME_TYPE,
        width,
        height,
    })
}
